//! ARP (Address Resolution Protocol) 모듈
//!
//! 16칸 고정 캐시. 같은 IP는 덮어쓰고, 빈 칸이 없으면 0번 칸을 밀어냅니다.
//! 타임스탬프는 기록만 하고 교체 대상 선택에는 쓰지 않습니다.

use super::ethernet::{EtherType, EthernetDriver, EthernetHeader, MacAddress};
use super::ip::Ipv4Address;
use super::stack::NetworkStack;
use super::NetworkError;

pub const ARP_CACHE_SIZE: usize = 16;

const HARDWARE_ETHERNET: u16 = 1;
const PROTOCOL_IPV4: u16 = 0x0800;

/// ARP 동작 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    Request,
    Reply,
    Unknown(u16),
}

impl From<u16> for ArpOperation {
    fn from(value: u16) -> Self {
        match value {
            1 => ArpOperation::Request,
            2 => ArpOperation::Reply,
            n => ArpOperation::Unknown(n),
        }
    }
}

impl From<ArpOperation> for u16 {
    fn from(op: ArpOperation) -> Self {
        match op {
            ArpOperation::Request => 1,
            ArpOperation::Reply => 2,
            ArpOperation::Unknown(n) => n,
        }
    }
}

/// 이더넷/IPv4용 28바이트 ARP 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub operation: ArpOperation,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Address,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Address,
}

impl ArpPacket {
    pub const SIZE: usize = 28;

    pub fn new(
        operation: ArpOperation,
        sender_mac: MacAddress,
        sender_ip: Ipv4Address,
        target_mac: MacAddress,
        target_ip: Ipv4Address,
    ) -> Self {
        Self {
            hardware_type: HARDWARE_ETHERNET,
            protocol_type: PROTOCOL_IPV4,
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::SIZE {
            return None;
        }
        // 주소 길이가 6/4가 아니면 오프셋 자체가 맞지 않음
        if payload[4] != 6 || payload[5] != 4 {
            return None;
        }
        Some(Self {
            hardware_type: u16::from_be_bytes([payload[0], payload[1]]),
            protocol_type: u16::from_be_bytes([payload[2], payload[3]]),
            operation: u16::from_be_bytes([payload[6], payload[7]]).into(),
            sender_mac: MacAddress::from_slice(&payload[8..14]),
            sender_ip: Ipv4Address::from_slice(&payload[14..18]),
            target_mac: MacAddress::from_slice(&payload[18..24]),
            target_ip: Ipv4Address::from_slice(&payload[24..28]),
        })
    }

    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hardware_type == HARDWARE_ETHERNET && self.protocol_type == PROTOCOL_IPV4
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.hardware_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.protocol_type.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&u16::from(self.operation).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.0);
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.0);
    }
}

/// ARP 캐시 엔트리
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Address,
    pub mac: MacAddress,
    /// 마지막 갱신 시각 (밀리초)
    pub timestamp: u64,
    pub valid: bool,
}

impl ArpEntry {
    const EMPTY: Self = Self {
        ip: Ipv4Address::UNSPECIFIED,
        mac: MacAddress::ZERO,
        timestamp: 0,
        valid: false,
    };
}

/// 고정 크기 ARP 캐시
#[derive(Debug, Clone)]
pub struct ArpCache {
    entries: [ArpEntry; ARP_CACHE_SIZE],
}

impl ArpCache {
    pub const fn new() -> Self {
        Self {
            entries: [ArpEntry::EMPTY; ARP_CACHE_SIZE],
        }
    }

    pub fn lookup(&self, ip: Ipv4Address) -> Option<MacAddress> {
        self.entries
            .iter()
            .find(|e| e.valid && e.ip == ip)
            .map(|e| e.mac)
    }

    /// 같은 IP 갱신 → 첫 빈 칸 → 0번 칸 순서로 기록
    pub fn insert(&mut self, ip: Ipv4Address, mac: MacAddress, now_ms: u64) {
        let slot = self
            .entries
            .iter()
            .position(|e| e.valid && e.ip == ip)
            .or_else(|| self.entries.iter().position(|e| !e.valid))
            .unwrap_or(0);

        self.entries[slot] = ArpEntry {
            ip,
            mac,
            timestamp: now_ms,
            valid: true,
        };
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArpEntry> {
        self.entries.iter().filter(|e| e.valid)
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: EthernetDriver> NetworkStack<D> {
    /// 캐시 조회. 없으면 브로드캐스트 요청을 보내고 `None` (기다리지 않음)
    pub fn arp_lookup(&mut self, ip: Ipv4Address) -> Option<MacAddress> {
        if let Some(mac) = self.arp.lookup(ip) {
            return Some(mac);
        }
        if let Err(err) = self.arp_send_request(ip) {
            crate::log_debug!("arp: request for {} not sent: {}", ip, err);
        }
        None
    }

    /// `ip`에 대한 브로드캐스트 ARP 요청
    pub fn arp_send_request(&mut self, ip: Ipv4Address) -> Result<(), NetworkError> {
        let request = ArpPacket::new(ArpOperation::Request, self.mac, self.ip, MacAddress::ZERO, ip);
        self.arp_send(MacAddress::BROADCAST, &request)
    }

    fn arp_send(&mut self, destination: MacAddress, packet: &ArpPacket) -> Result<(), NetworkError> {
        let mut frame = [0u8; EthernetHeader::SIZE + ArpPacket::SIZE];
        EthernetHeader {
            destination,
            source: self.mac,
            ether_type: EtherType::Arp,
        }
        .write_to(&mut frame);
        packet.write_to(&mut frame[EthernetHeader::SIZE..]);
        self.send_frame(&frame)
    }

    /// 수신한 ARP 패킷 처리: 송신자를 학습하고, 우리 IP에 대한 요청이면 응답
    pub(crate) fn arp_process(&mut self, payload: &[u8]) {
        let Some(packet) = ArpPacket::parse(payload) else {
            self.stats.drop_malformed_arp += 1;
            return;
        };
        if !packet.is_ethernet_ipv4() {
            crate::log_trace!(
                "arp: unsupported hw/proto {:#06x}/{:#06x}",
                packet.hardware_type,
                packet.protocol_type
            );
            self.stats.drop_malformed_arp += 1;
            return;
        }

        let now = crate::drivers::timer::milliseconds();
        self.arp.insert(packet.sender_ip, packet.sender_mac, now);

        if packet.operation == ArpOperation::Request && packet.target_ip == self.ip && !self.ip.is_unspecified() {
            let reply = ArpPacket::new(
                ArpOperation::Reply,
                self.mac,
                self.ip,
                packet.sender_mac,
                packet.sender_ip,
            );
            if let Err(err) = self.arp_send(packet.sender_mac, &reply) {
                crate::log_debug!("arp: reply to {} failed: {}", packet.sender_ip, err);
            }
        }
    }
}
