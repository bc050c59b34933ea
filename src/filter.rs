use std::net::IpAddr;

/// Capture filter that only lets through UDP traffic to or from the server.
pub fn build_filter(server_addr: IpAddr, server_port: u16) -> String {
    format!(
        "udp and ((dst {addr} and dst port {port}) or (src {addr} and src port {port}))",
        addr = server_addr,
        port = server_port
    )
}
