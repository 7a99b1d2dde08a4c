//! DHCPv4 클라이언트
//!
//! DISCOVER/OFFER → REQUEST/ACK 두 번의 왕복만 수행합니다. 타이머 대신
//! `process_frames()` 호출 횟수로 대기 한도를 정합니다. 임대 갱신은 하지 않습니다.

use super::ethernet::{EthernetDriver, MacAddress};
use super::ip::Ipv4Address;
use super::stack::NetworkStack;
use super::udp::UdpDatagram;
use super::NetworkError;

pub const CLIENT_PORT: u16 = 68;
pub const SERVER_PORT: u16 = 67;

const OP_BOOTREQUEST: u8 = 1;
const OP_BOOTREPLY: u8 = 2;
const HTYPE_ETHERNET: u8 = 1;
const HLEN_ETHERNET: u8 = 6;
const FLAG_BROADCAST: u16 = 0x8000;
const MAGIC_COOKIE: u32 = 0x6382_5363;

/// 고정 필드(236) + 매직 쿠키(4)
const OPTIONS_OFFSET: usize = 240;
const OPTIONS_LEN: usize = 312;
/// 송신 패킷 크기
pub const PACKET_SIZE: usize = OPTIONS_OFFSET + OPTIONS_LEN;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_PARAM_REQUEST_LIST: u8 = 55;
const OPT_END: u8 = 255;

/// DHCP 메시지 타입 (옵션 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Ack,
    Nak,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::Discover,
            2 => MessageType::Offer,
            3 => MessageType::Request,
            5 => MessageType::Ack,
            6 => MessageType::Nak,
            n => MessageType::Other(n),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Discover => 1,
            MessageType::Offer => 2,
            MessageType::Request => 3,
            MessageType::Ack => 5,
            MessageType::Nak => 6,
            MessageType::Other(n) => n,
        }
    }
}

/// 클라이언트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    Start,
    Offered,
    Acked,
    Failed,
}

/// `handle_reply` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpEvent {
    Ignored,
    Offer(Ipv4Address),
    Ack(Ipv4Address),
    Nak,
}

/// TLV 옵션 기록기. 공간이 모자라면 `OptionsFull`
struct OptionWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> OptionWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn push(&mut self, code: u8, data: &[u8]) -> Result<(), NetworkError> {
        let end = self.pos + 2 + data.len();
        if end > self.buf.len() || data.len() > u8::MAX as usize {
            return Err(NetworkError::OptionsFull);
        }
        self.buf[self.pos] = code;
        self.buf[self.pos + 1] = data.len() as u8;
        self.buf[self.pos + 2..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn finish(self) -> Result<usize, NetworkError> {
        if self.pos >= self.buf.len() {
            return Err(NetworkError::OptionsFull);
        }
        self.buf[self.pos] = OPT_END;
        Ok(self.pos + 1)
    }
}

/// BOOTREQUEST 공통 필드 기록 후 옵션 영역 반환
fn write_bootrequest(buf: &mut [u8; PACKET_SIZE], xid: u32, mac: MacAddress) -> &mut [u8] {
    buf.fill(0);
    buf[0] = OP_BOOTREQUEST;
    buf[1] = HTYPE_ETHERNET;
    buf[2] = HLEN_ETHERNET;
    buf[4..8].copy_from_slice(&xid.to_be_bytes());
    buf[10..12].copy_from_slice(&FLAG_BROADCAST.to_be_bytes());
    buf[28..34].copy_from_slice(&mac.0);
    buf[236..240].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    &mut buf[OPTIONS_OFFSET..]
}

/// DISCOVER 패킷 생성
pub fn build_discover(buf: &mut [u8; PACKET_SIZE], xid: u32, mac: MacAddress) -> Result<(), NetworkError> {
    let mut options = OptionWriter::new(write_bootrequest(buf, xid, mac));
    options.push(OPT_MESSAGE_TYPE, &[MessageType::Discover.into()])?;
    options.push(OPT_PARAM_REQUEST_LIST, &[OPT_SUBNET_MASK, OPT_ROUTER, OPT_DNS])?;
    options.finish()?;
    Ok(())
}

/// REQUEST 패킷 생성 (요청 주소와 서버 식별자 포함)
pub fn build_request(
    buf: &mut [u8; PACKET_SIZE],
    xid: u32,
    mac: MacAddress,
    requested: Ipv4Address,
    server: Ipv4Address,
) -> Result<(), NetworkError> {
    let mut options = OptionWriter::new(write_bootrequest(buf, xid, mac));
    options.push(OPT_MESSAGE_TYPE, &[MessageType::Request.into()])?;
    options.push(OPT_REQUESTED_IP, &requested.0)?;
    options.push(OPT_SERVER_ID, &server.0)?;
    options.finish()?;
    Ok(())
}

/// 옵션 영역에서 `code` 값 찾기. 잘린 옵션을 만나면 중단
pub fn find_option(options: &[u8], code: u8) -> Option<&[u8]> {
    let mut pos = 0;
    while pos < options.len() {
        match options[pos] {
            OPT_END => return None,
            OPT_PAD => pos += 1,
            current => {
                let len = *options.get(pos + 1)? as usize;
                let value = options.get(pos + 2..pos + 2 + len)?;
                if current == code {
                    return Some(value);
                }
                pos += 2 + len;
            }
        }
    }
    None
}

/// 단일 인스턴스 DHCP 클라이언트 상태
#[derive(Debug, Clone, Copy)]
pub struct DhcpClient {
    state: DhcpState,
    xid: u32,
    offered_ip: Ipv4Address,
    server_id: Ipv4Address,
}

impl DhcpClient {
    pub const fn new() -> Self {
        Self {
            state: DhcpState::Start,
            xid: 0,
            offered_ip: Ipv4Address::UNSPECIFIED,
            server_id: Ipv4Address::UNSPECIFIED,
        }
    }

    pub fn state(&self) -> DhcpState {
        self.state
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn offered_ip(&self) -> Ipv4Address {
        self.offered_ip
    }

    pub fn server_id(&self) -> Ipv4Address {
        self.server_id
    }

    /// 새 시도 시작. xid는 난수가 아니라 누적 카운터
    pub fn begin(&mut self, seed: u16) -> u32 {
        self.xid = self.xid.wrapping_add(0x12345 + seed as u32);
        self.state = DhcpState::Start;
        self.offered_ip = Ipv4Address::UNSPECIFIED;
        self.server_id = Ipv4Address::UNSPECIFIED;
        self.xid
    }

    /// 서버 응답 하나 처리
    pub fn handle_reply(&mut self, source_port: u16, payload: &[u8]) -> DhcpEvent {
        if source_port != SERVER_PORT || payload.len() < OPTIONS_OFFSET {
            return DhcpEvent::Ignored;
        }
        if payload[0] != OP_BOOTREPLY {
            return DhcpEvent::Ignored;
        }
        let xid = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let cookie = u32::from_be_bytes([payload[236], payload[237], payload[238], payload[239]]);
        if xid != self.xid || cookie != MAGIC_COOKIE {
            return DhcpEvent::Ignored;
        }

        let yiaddr = Ipv4Address::from_slice(&payload[16..20]);
        let options = &payload[OPTIONS_OFFSET..];
        let kind = match find_option(options, OPT_MESSAGE_TYPE) {
            Some([kind, ..]) => MessageType::from(*kind),
            _ => return DhcpEvent::Ignored,
        };

        match kind {
            // REQUEST를 보낸 뒤 도착한 다른 OFFER는 무시
            MessageType::Offer if self.state == DhcpState::Start => {
                let server = match find_option(options, OPT_SERVER_ID) {
                    Some(id) if id.len() == 4 => Ipv4Address::from_slice(id),
                    _ => Ipv4Address::UNSPECIFIED,
                };
                if server.is_unspecified() {
                    return DhcpEvent::Ignored;
                }
                self.offered_ip = yiaddr;
                self.server_id = server;
                self.state = DhcpState::Offered;
                DhcpEvent::Offer(yiaddr)
            }
            // 주소는 우리가 REQUEST한 OFFER에 대한 ACK로만 확정
            MessageType::Ack if self.state == DhcpState::Offered => {
                self.state = DhcpState::Acked;
                DhcpEvent::Ack(yiaddr)
            }
            MessageType::Nak => {
                self.state = DhcpState::Failed;
                DhcpEvent::Nak
            }
            _ => DhcpEvent::Ignored,
        }
    }
}

impl Default for DhcpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// 포트 68 콜백
fn dhcp_reply<D: EthernetDriver>(stack: &mut NetworkStack<D>, datagram: &UdpDatagram<'_>) {
    match stack.dhcp.handle_reply(datagram.source_port, datagram.payload) {
        DhcpEvent::Offer(ip) => {
            crate::log_debug!("dhcp: offer {} from {}", ip, stack.dhcp.server_id());
        }
        DhcpEvent::Ack(ip) => {
            crate::log_info!("dhcp: lease acknowledged for {}", ip);
            stack.set_ip(ip);
        }
        DhcpEvent::Nak => crate::log_warn!("dhcp: server sent NAK"),
        DhcpEvent::Ignored => crate::log_trace!("dhcp: ignored reply from {}", datagram.source_ip),
    }
}

impl<D: EthernetDriver> NetworkStack<D> {
    /// DHCP로 주소 획득. 성공하면 받은 주소가 이미 적용된 상태
    pub fn dhcp_acquire(&mut self) -> Result<Ipv4Address, NetworkError> {
        self.udp_register(CLIENT_PORT, dhcp_reply::<D>)?;
        let xid = self.dhcp.begin(self.ip_id);
        crate::log_info!("dhcp: DISCOVER xid={:#010x}", xid);

        let mut packet = [0u8; PACKET_SIZE];
        build_discover(&mut packet, xid, self.mac)?;
        self.udp_send(Ipv4Address::BROADCAST, SERVER_PORT, CLIENT_PORT, &packet)?;
        self.dhcp_poll(DhcpState::Start);

        if self.dhcp.state() != DhcpState::Offered {
            crate::log_warn!("dhcp: no offer received");
            return Err(match self.dhcp.state() {
                DhcpState::Failed => NetworkError::DhcpNak,
                _ => NetworkError::DhcpNoOffer,
            });
        }

        let (offered, server) = (self.dhcp.offered_ip(), self.dhcp.server_id());
        crate::log_info!("dhcp: REQUEST {} from server {}", offered, server);
        build_request(&mut packet, xid, self.mac, offered, server)?;
        self.udp_send(Ipv4Address::BROADCAST, SERVER_PORT, CLIENT_PORT, &packet)?;
        self.dhcp_poll(DhcpState::Offered);

        match self.dhcp.state() {
            DhcpState::Acked => Ok(self.ip),
            DhcpState::Failed => Err(NetworkError::DhcpNak),
            _ => {
                crate::log_warn!("dhcp: no ACK received");
                Err(NetworkError::DhcpNoAck)
            }
        }
    }

    /// 상태가 `waiting`에서 벗어나거나 한도에 닿을 때까지 수신 처리
    fn dhcp_poll(&mut self, waiting: DhcpState) {
        for _ in 0..self.config.dhcp_poll_limit {
            if self.dhcp.state() != waiting {
                break;
            }
            self.process_frames();
        }
    }
}
