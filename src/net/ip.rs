//! IP (Internet Protocol) 모듈
//!
//! 옵션 없는 20바이트 IPv4 헤더만 다룹니다. 단편화/재조립은 하지 않습니다.

use core::fmt;
use core::str::FromStr;

use super::ethernet::{EtherType, EthernetDriver, EthernetHeader, MacAddress};
use super::stack::NetworkStack;
use super::{NetworkError, MAX_FRAME_SIZE};

/// IPv4 주소 (4바이트)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipv4Address(pub [u8; 4]);

impl Ipv4Address {
    /// 브로드캐스트 주소 (255.255.255.255)
    pub const BROADCAST: Ipv4Address = Ipv4Address([255, 255, 255, 255]);

    /// 빈 주소 (0.0.0.0)
    pub const UNSPECIFIED: Ipv4Address = Ipv4Address([0, 0, 0, 0]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address([a, b, c, d])
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Ipv4Address([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// 점으로 구분된 4개 10진수가 아닌 문자열
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrParseError;

impl FromStr for Ipv4Address {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(AddrParseError)?;
            if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AddrParseError);
            }
            let value: u16 = part.parse().map_err(|_| AddrParseError)?;
            *octet = u8::try_from(value).map_err(|_| AddrParseError)?;
        }
        if parts.next().is_some() {
            return Err(AddrParseError);
        }
        Ok(Ipv4Address(octets))
    }
}

/// IP 프로토콜 번호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Unknown(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            n => IpProtocol::Unknown(n),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(protocol: IpProtocol) -> Self {
        match protocol {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Unknown(n) => n,
        }
    }
}

/// 인터넷 체크섬 (RFC 1071)
///
/// 16비트 빅엔디언 워드의 합에 캐리를 되접어 넣고 1의 보수를 취합니다.
/// 홀수 길이면 마지막 바이트 뒤에 0을 채웁니다.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// IPv4 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// 헤더 길이 (바이트, IHL * 4)
    pub header_len: usize,
    pub total_len: u16,
    pub identification: u16,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub checksum: u16,
    pub source: Ipv4Address,
    pub destination: Ipv4Address,
}

impl Ipv4Header {
    pub const SIZE: usize = 20;
    pub const DEFAULT_TTL: u8 = 64;

    /// 송신용 헤더
    pub fn new(source: Ipv4Address, destination: Ipv4Address, protocol: IpProtocol, payload_len: usize, id: u16) -> Self {
        Self {
            header_len: Self::SIZE,
            total_len: (Self::SIZE + payload_len) as u16,
            identification: id,
            ttl: Self::DEFAULT_TTL,
            protocol,
            checksum: 0,
            source,
            destination,
        }
    }

    /// 필드만 파싱. 길이 검증은 `ipv4_process`에서
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            header_len: ((packet[0] & 0x0F) as usize) * 4,
            total_len: u16::from_be_bytes([packet[2], packet[3]]),
            identification: u16::from_be_bytes([packet[4], packet[5]]),
            ttl: packet[8],
            protocol: packet[9].into(),
            checksum: u16::from_be_bytes([packet[10], packet[11]]),
            source: Ipv4Address::from_slice(&packet[12..16]),
            destination: Ipv4Address::from_slice(&packet[16..20]),
        })
    }

    /// `buf` 앞 20바이트에 체크섬을 계산해 기록
    pub fn write_to(&self, buf: &mut [u8]) {
        let header = &mut buf[..Self::SIZE];
        header[0] = 0x45;
        header[1] = 0;
        header[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        header[4..6].copy_from_slice(&self.identification.to_be_bytes());
        // 플래그/단편 오프셋 없음
        header[6..8].copy_from_slice(&[0, 0]);
        header[8] = self.ttl;
        header[9] = self.protocol.into();
        header[10..12].copy_from_slice(&[0, 0]);
        header[12..16].copy_from_slice(&self.source.0);
        header[16..20].copy_from_slice(&self.destination.0);

        let checksum = internet_checksum(header);
        header[10..12].copy_from_slice(&checksum.to_be_bytes());
    }
}

/// 고정 20바이트 헤더의 체크섬 검증 (체크섬 필드를 0으로 두고 다시 계산)
pub fn verify_header_checksum(packet: &[u8]) -> bool {
    if packet.len() < Ipv4Header::SIZE {
        return false;
    }
    let mut header = [0u8; Ipv4Header::SIZE];
    header.copy_from_slice(&packet[..Ipv4Header::SIZE]);
    let stored = u16::from_be_bytes([header[10], header[11]]);
    header[10] = 0;
    header[11] = 0;
    internet_checksum(&header) == stored
}

impl<D: EthernetDriver> NetworkStack<D> {
    /// IPv4 패킷 송신
    ///
    /// 목적지 MAC을 ARP로 찾지 못하면 브로드캐스트로 보냅니다.
    pub fn ipv4_send(&mut self, destination: Ipv4Address, protocol: IpProtocol, payload: &[u8]) -> Result<(), NetworkError> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized);
        }
        let frame_len = EthernetHeader::SIZE + Ipv4Header::SIZE + payload.len();
        if frame_len > MAX_FRAME_SIZE {
            return Err(NetworkError::PayloadTooLarge);
        }

        let dest_mac = if destination.is_broadcast() {
            MacAddress::BROADCAST
        } else {
            self.arp_lookup(destination).unwrap_or(MacAddress::BROADCAST)
        };

        let id = self.ip_id;
        self.ip_id = self.ip_id.wrapping_add(1);

        let mut frame = [0u8; MAX_FRAME_SIZE];
        EthernetHeader {
            destination: dest_mac,
            source: self.mac,
            ether_type: EtherType::Ipv4,
        }
        .write_to(&mut frame);
        Ipv4Header::new(self.ip, destination, protocol, payload.len(), id)
            .write_to(&mut frame[EthernetHeader::SIZE..]);
        frame[EthernetHeader::SIZE + Ipv4Header::SIZE..frame_len].copy_from_slice(payload);

        self.send_frame(&frame[..frame_len])
    }

    /// 체크섬이 검증된 IPv4 패킷 처리
    pub(crate) fn ipv4_process(&mut self, packet: &[u8]) {
        let Some(header) = Ipv4Header::parse(packet) else {
            self.stats.drop_malformed_ip += 1;
            return;
        };
        if header.header_len < Ipv4Header::SIZE || header.header_len > packet.len() {
            crate::log_trace!("ip: bad header length {}", header.header_len);
            self.stats.drop_malformed_ip += 1;
            return;
        }
        let total_len = header.total_len as usize;
        if total_len < header.header_len || total_len > packet.len() {
            crate::log_trace!("ip: bad total length {} (have {})", total_len, packet.len());
            self.stats.drop_malformed_ip += 1;
            return;
        }

        // 이더넷 패딩은 total_len 뒤에서 잘림
        let payload = &packet[header.header_len..total_len];
        match header.protocol {
            IpProtocol::Udp => self.udp_process(header.source, payload),
            other => {
                crate::log_trace!("ip: dropping protocol {}", u8::from(other));
                self.stats.drop_unknown_protocol += 1;
            }
        }
    }
}
