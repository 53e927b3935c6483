/// Display version information
pub fn execute() {
    println!("ipgate {}", env!("CARGO_PKG_VERSION"));
    println!("IP whitelist authorization and firewall synchronization");
}
