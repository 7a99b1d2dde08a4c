//! 테스트용 가짜 NIC와 프레임 생성기

use std::collections::VecDeque;
use std::vec;
use std::vec::Vec;

use crate::config::NetConfig;

use super::arp::{ArpOperation, ArpPacket};
use super::dhcp::{self, MessageType};
use super::ethernet::{EtherType, EthernetDriver, EthernetHeader, MacAddress};
use super::ip::{IpProtocol, Ipv4Address, Ipv4Header};
use super::stack::NetworkStack;
use super::udp::UdpHeader;
use super::NetworkError;

pub const OUR_MAC: MacAddress = MacAddress([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
pub const PEER_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
pub const SERVER_MAC: MacAddress = MacAddress([0x52, 0x55, 0x0A, 0x00, 0x02, 0x02]);

pub const DHCP_SERVER_IP: Ipv4Address = Ipv4Address::new(10, 0, 2, 2);
pub const DHCP_OFFERED_IP: Ipv4Address = Ipv4Address::new(10, 0, 2, 15);

/// 송신 프레임을 보고 돌려줄 수신 프레임을 만드는 스크립트
pub type Responder = fn(&[u8]) -> Vec<Vec<u8>>;

/// 큐 기반 가짜 드라이버
pub struct FakeDriver {
    pub rx: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    /// UDP 콜백 테스트가 받은 데이터그램을 기록하는 곳
    pub notes: Vec<(Ipv4Address, u16, u16, Vec<u8>)>,
    pub responder: Option<Responder>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            sent: Vec::new(),
            notes: Vec::new(),
            responder: None,
        }
    }

    pub fn inject(&mut self, frame: &[u8]) {
        self.rx.push_back(frame.to_vec());
    }

    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sent)
    }
}

impl EthernetDriver for FakeDriver {
    fn name(&self) -> &str {
        "fake"
    }

    fn mac_address(&self) -> MacAddress {
        OUR_MAC
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetworkError> {
        self.sent.push(frame.to_vec());
        if let Some(responder) = self.responder {
            self.rx.extend(responder(frame));
        }
        Ok(())
    }

    fn receive_frame(&mut self, buffer: &mut [u8]) -> usize {
        match self.rx.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buffer.len());
                buffer[..len].copy_from_slice(&frame[..len]);
                len
            }
            None => 0,
        }
    }
}

pub fn stack_with_config(config: NetConfig, ip: [u8; 4]) -> NetworkStack<FakeDriver> {
    let mut stack = NetworkStack::new(config);
    stack.init(FakeDriver::new()).unwrap();
    stack.ip = Ipv4Address(ip);
    stack
}

pub fn stack_with_ip(ip: [u8; 4]) -> NetworkStack<FakeDriver> {
    stack_with_config(NetConfig::DEFAULT, ip)
}

/// 최소 길이(60바이트)까지 0으로 채움
fn pad(mut frame: Vec<u8>) -> Vec<u8> {
    if frame.len() < 60 {
        frame.resize(60, 0);
    }
    frame
}

pub fn arp_frame(
    operation: ArpOperation,
    sender_mac: MacAddress,
    sender_ip: Ipv4Address,
    target_mac: MacAddress,
    target_ip: Ipv4Address,
) -> Vec<u8> {
    let destination = match operation {
        ArpOperation::Request => MacAddress::BROADCAST,
        _ => target_mac,
    };
    let mut frame = vec![0u8; EthernetHeader::SIZE + ArpPacket::SIZE];
    EthernetHeader {
        destination,
        source: sender_mac,
        ether_type: EtherType::Arp,
    }
    .write_to(&mut frame);
    ArpPacket::new(operation, sender_mac, sender_ip, target_mac, target_ip)
        .write_to(&mut frame[EthernetHeader::SIZE..]);
    pad(frame)
}

/// `OUR_MAC`(브로드캐스트 IP면 브로드캐스트 MAC)으로 가는 UDP 프레임
pub fn ipv4_udp_frame(
    source_mac: MacAddress,
    source_ip: Ipv4Address,
    destination_ip: Ipv4Address,
    source_port: u16,
    destination_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = UdpHeader::SIZE + payload.len();
    let mut frame = vec![0u8; EthernetHeader::SIZE + Ipv4Header::SIZE + udp_len];
    EthernetHeader {
        destination: if destination_ip.is_broadcast() {
            MacAddress::BROADCAST
        } else {
            OUR_MAC
        },
        source: source_mac,
        ether_type: EtherType::Ipv4,
    }
    .write_to(&mut frame);
    Ipv4Header::new(source_ip, destination_ip, IpProtocol::Udp, udp_len, 1)
        .write_to(&mut frame[EthernetHeader::SIZE..]);
    let udp = &mut frame[EthernetHeader::SIZE + Ipv4Header::SIZE..];
    UdpHeader {
        source_port,
        destination_port,
        length: udp_len as u16,
        checksum: 0,
    }
    .write_to(udp);
    udp[UdpHeader::SIZE..].copy_from_slice(payload);
    pad(frame)
}

/// 서버 → 클라이언트 BOOTREPLY 페이로드
pub fn dhcp_reply(xid: u32, kind: MessageType, yiaddr: Ipv4Address, server: Option<Ipv4Address>) -> Vec<u8> {
    let mut packet = vec![0u8; dhcp::PACKET_SIZE];
    packet[0] = 2;
    packet[1] = 1;
    packet[2] = 6;
    packet[4..8].copy_from_slice(&xid.to_be_bytes());
    packet[16..20].copy_from_slice(&yiaddr.0);
    packet[28..34].copy_from_slice(&OUR_MAC.0);
    packet[236..240].copy_from_slice(&[0x63, 0x82, 0x53, 0x63]);

    let mut options: Vec<u8> = vec![53, 1, u8::from(kind)];
    if let Some(server) = server {
        options.extend_from_slice(&[54, 4]);
        options.extend_from_slice(&server.0);
    }
    options.push(255);
    packet[240..240 + options.len()].copy_from_slice(&options);
    packet
}

/// 송신 프레임이 DHCP 요청이면 (xid, 메시지 타입)
fn dhcp_request_of(frame: &[u8]) -> Option<(u32, MessageType)> {
    let ip = frame.get(EthernetHeader::SIZE..)?;
    if frame.get(12..14)? != &[0x08, 0x00][..] || *ip.get(9)? != 17 {
        return None;
    }
    let udp = ip.get(Ipv4Header::SIZE..)?;
    if UdpHeader::parse(udp)?.destination_port != dhcp::SERVER_PORT {
        return None;
    }
    let payload = udp.get(UdpHeader::SIZE..)?;
    let xid = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let kind = dhcp::find_option(payload.get(240..)?, 53)?;
    Some((xid, MessageType::from(kind[0])))
}

fn server_frame(xid: u32, kind: MessageType, yiaddr: Ipv4Address) -> Vec<u8> {
    ipv4_udp_frame(
        SERVER_MAC,
        DHCP_SERVER_IP,
        Ipv4Address::BROADCAST,
        dhcp::SERVER_PORT,
        dhcp::CLIENT_PORT,
        &dhcp_reply(xid, kind, yiaddr, Some(DHCP_SERVER_IP)),
    )
}

/// DISCOVER엔 OFFER, REQUEST엔 ACK
pub fn dhcp_server(frame: &[u8]) -> Vec<Vec<u8>> {
    match dhcp_request_of(frame) {
        Some((xid, MessageType::Discover)) => vec![server_frame(xid, MessageType::Offer, DHCP_OFFERED_IP)],
        Some((xid, MessageType::Request)) => vec![server_frame(xid, MessageType::Ack, DHCP_OFFERED_IP)],
        _ => Vec::new(),
    }
}

/// DISCOVER엔 OFFER, REQUEST엔 NAK
pub fn dhcp_nak_server(frame: &[u8]) -> Vec<Vec<u8>> {
    match dhcp_request_of(frame) {
        Some((xid, MessageType::Discover)) => vec![server_frame(xid, MessageType::Offer, DHCP_OFFERED_IP)],
        Some((xid, MessageType::Request)) => vec![server_frame(xid, MessageType::Nak, Ipv4Address::UNSPECIFIED)],
        _ => Vec::new(),
    }
}

/// OFFER 없이 DISCOVER에 바로 ACK
pub fn dhcp_ack_only_server(frame: &[u8]) -> Vec<Vec<u8>> {
    match dhcp_request_of(frame) {
        Some((xid, MessageType::Discover)) => vec![server_frame(xid, MessageType::Ack, DHCP_OFFERED_IP)],
        _ => Vec::new(),
    }
}

pub fn silent(_: &[u8]) -> Vec<Vec<u8>> {
    Vec::new()
}
