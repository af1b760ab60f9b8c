//! Plays a NAS against a running server: PAP login, then accounting
//! Start and Stop for the same session.
//!
//! cargo run --example nas_client -- alice secret1 nastest 127.0.0.1

use radius_proto::{
    AcctStatusType, Attribute, AttributeType, Code, Packet, encode_signed_request,
    encrypt_user_password, generate_request_authenticator,
};
use std::net::UdpSocket;
use std::time::Duration;

fn exchange(
    socket: &UdpSocket,
    addr: &str,
    bytes: &[u8],
) -> Result<Packet, Box<dyn std::error::Error>> {
    socket.send_to(bytes, addr)?;
    let mut buffer = vec![0u8; 4096];
    let (len, _) = socket.recv_from(&mut buffer)?;
    Ok(Packet::decode(&buffer[..len])?)
}

fn accounting(
    username: &str,
    session_id: &str,
    status: AcctStatusType,
) -> Result<Packet, Box<dyn std::error::Error>> {
    let mut packet = Packet::new(Code::AccountingRequest, rand_identifier(), [0u8; 16]);
    packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), username)?);
    let status = status.as_u32();
    packet.add_attribute(Attribute::integer(AttributeType::AcctStatusType.as_u8(), status)?);
    packet.add_attribute(Attribute::string(AttributeType::AcctSessionId.as_u8(), session_id)?);
    packet.add_attribute(Attribute::string(
        AttributeType::CallingStationId.as_u8(),
        "AA-BB-CC-DD-EE-FF",
    )?);
    Ok(packet)
}

fn rand_identifier() -> u8 {
    generate_request_authenticator()[0]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <username> <password> <secret> [server_ip]", args[0]);
        std::process::exit(1);
    }

    let username = &args[1];
    let password = &args[2];
    let secret = args[3].as_bytes();
    let server = args.get(4).map(String::as_str).unwrap_or("127.0.0.1");
    let auth_addr = format!("{}:1812", server);
    let acct_addr = format!("{}:1813", server);

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(Duration::from_secs(5)))?;

    let authenticator = generate_request_authenticator();
    let mut request = Packet::new(Code::AccessRequest, rand_identifier(), authenticator);
    request.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), username.as_str())?);
    let hidden = encrypt_user_password(password, secret, &authenticator);
    request.add_attribute(Attribute::new(AttributeType::UserPassword.as_u8(), hidden)?);

    let reply = exchange(&socket, &auth_addr, &request.encode()?)?;
    let message = reply.get_string(AttributeType::ReplyMessage).unwrap_or_default();
    println!("{:?}: {}", reply.code, message);
    if reply.code != Code::AccessAccept {
        return Ok(());
    }
    if let Some(timeout) = reply.get_integer(AttributeType::SessionTimeout) {
        println!("  Session-Timeout: {}s", timeout);
    }

    let session_id: String = authenticator[..4].iter().map(|b| format!("{:02x}", b)).collect();
    for status in [AcctStatusType::Start, AcctStatusType::Stop] {
        let mut packet = accounting(username, &session_id, status)?;
        let bytes = encode_signed_request(&mut packet, secret)?;
        let reply = exchange(&socket, &acct_addr, &bytes)?;
        println!("{:?} {}: {:?}", status, session_id, reply.code);
    }

    Ok(())
}
