//! UDP (User Datagram Protocol) 모듈
//!
//! 목적지 포트 → 콜백 함수의 8칸 고정 테이블입니다. 해제 연산은 없습니다.
//! 송신 체크섬은 항상 0 (IPv4에서는 선택 사항).

use super::ethernet::{EthernetDriver, EthernetHeader};
use super::ip::{IpProtocol, Ipv4Address, Ipv4Header};
use super::stack::NetworkStack;
use super::{NetworkError, MAX_FRAME_SIZE};

/// 소켓 테이블 크기
pub const UDP_SOCKETS: usize = 8;

/// 한 프레임에 들어가는 UDP 세그먼트 최대 크기
pub const MAX_SEGMENT_SIZE: usize = MAX_FRAME_SIZE - EthernetHeader::SIZE - Ipv4Header::SIZE;

/// UDP 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    /// 헤더 포함 길이
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub const SIZE: usize = 8;

    pub fn parse(segment: &[u8]) -> Option<Self> {
        if segment.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            source_port: u16::from_be_bytes([segment[0], segment[1]]),
            destination_port: u16::from_be_bytes([segment[2], segment[3]]),
            length: u16::from_be_bytes([segment[4], segment[5]]),
            checksum: u16::from_be_bytes([segment[6], segment[7]]),
        })
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
    }
}

/// 콜백에 전달되는 수신 데이터그램
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDatagram<'a> {
    pub source_ip: Ipv4Address,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: &'a [u8],
}

/// 포트 콜백. 스택 전체를 받으므로 콜백 안에서 바로 응답을 보낼 수 있습니다.
pub type UdpCallback<D> = fn(&mut NetworkStack<D>, &UdpDatagram<'_>);

struct UdpSocket<D> {
    port: u16,
    callback: UdpCallback<D>,
}

// fn 포인터만 담고 있으므로 D와 무관하게 복사 가능
impl<D> Clone for UdpSocket<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for UdpSocket<D> {}

/// 포트 → 콜백 테이블
pub struct SocketTable<D> {
    slots: [Option<UdpSocket<D>>; UDP_SOCKETS],
}

impl<D> SocketTable<D> {
    pub const fn new() -> Self {
        Self {
            slots: [None; UDP_SOCKETS],
        }
    }

    /// 같은 포트는 교체, 아니면 첫 빈 칸
    pub fn register(&mut self, port: u16, callback: UdpCallback<D>) -> Result<(), NetworkError> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(s) if s.port == port))
            .or_else(|| self.slots.iter().position(Option::is_none))
            .ok_or(NetworkError::SocketTableFull)?;

        self.slots[index] = Some(UdpSocket { port, callback });
        Ok(())
    }

    pub fn lookup(&self, port: u16) -> Option<UdpCallback<D>> {
        self.slots
            .iter()
            .flatten()
            .find(|s| s.port == port)
            .map(|s| s.callback)
    }

    pub fn is_registered(&self, port: u16) -> bool {
        self.lookup(port).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D> Default for SocketTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: EthernetDriver> NetworkStack<D> {
    /// 포트 콜백 등록. 스택이 초기화되어 있어야 함
    pub fn udp_register(&mut self, port: u16, callback: UdpCallback<D>) -> Result<(), NetworkError> {
        if !self.is_initialized() {
            return Err(NetworkError::NotInitialized);
        }
        self.sockets.register(port, callback)?;
        crate::log_debug!("udp: port {} registered", port);
        Ok(())
    }

    /// UDP 데이터그램 송신
    pub fn udp_send(
        &mut self,
        destination: Ipv4Address,
        destination_port: u16,
        source_port: u16,
        data: &[u8],
    ) -> Result<(), NetworkError> {
        let len = UdpHeader::SIZE + data.len();
        if len > MAX_SEGMENT_SIZE {
            return Err(NetworkError::PayloadTooLarge);
        }
        let mut segment = [0u8; MAX_SEGMENT_SIZE];

        UdpHeader {
            source_port,
            destination_port,
            length: len as u16,
            checksum: 0,
        }
        .write_to(&mut segment);
        segment[UdpHeader::SIZE..len].copy_from_slice(data);

        self.ipv4_send(destination, IpProtocol::Udp, &segment[..len])
    }

    /// IPv4 페이로드로 받은 UDP 세그먼트 처리
    pub(crate) fn udp_process(&mut self, source_ip: Ipv4Address, segment: &[u8]) {
        let Some(header) = UdpHeader::parse(segment) else {
            self.stats.drop_malformed_udp += 1;
            return;
        };
        let length = header.length as usize;
        if length < UdpHeader::SIZE || length > segment.len() {
            crate::log_trace!("udp: bad length {} (have {})", length, segment.len());
            self.stats.drop_malformed_udp += 1;
            return;
        }
        self.stats.udp_packets += 1;

        let Some(callback) = self.sockets.lookup(header.destination_port) else {
            crate::log_trace!("udp: no listener on port {}", header.destination_port);
            self.stats.drop_no_listener += 1;
            return;
        };

        let datagram = UdpDatagram {
            source_ip,
            source_port: header.source_port,
            destination_port: header.destination_port,
            payload: &segment[UdpHeader::SIZE..length],
        };
        self.stats.udp_callbacks += 1;
        callback(self, &datagram);
    }
}
