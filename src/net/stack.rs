//! 네트워크 스택 상태와 프레임 디스패처
//!
//! `NetworkStack`은 커널 최상위 상태가 소유하고 CLI와 타이머 틱에 참조로 전달됩니다.
//! 프로토콜별 연산은 각 모듈(arp, ip, udp, dhcp)의 `impl` 블록에 있습니다.

use crate::config::NetConfig;

use super::arp::{ArpCache, ArpPacket};
use super::dhcp::{DhcpClient, DhcpState};
use super::echo::EchoMailbox;
use super::ethernet::{EtherType, EthernetDriver, EthernetHeader, MacAddress};
use super::ip::{self, Ipv4Address, Ipv4Header};
use super::udp::SocketTable;
use super::{NetworkError, MAX_FRAME_SIZE};

/// 디버그 카운터 (NETINFO 출력용)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    /// `process_frames()` 호출 횟수
    pub process_calls: u64,
    /// 드라이버에서 꺼낸 프레임 수
    pub frames_received: u64,
    /// 드라이버 수신 호출 수
    pub driver_polls: u64,
    /// 빈 손으로 돌아온 수신 호출 수
    pub driver_empty_polls: u64,
    /// 길이 검증을 통과한 UDP 데이터그램 수
    pub udp_packets: u64,
    /// UDP 콜백 호출 수
    pub udp_callbacks: u64,
    /// 송신 프레임 수
    pub frames_sent: u64,
    /// 드라이버가 거절한 송신
    pub send_errors: u64,
    pub drop_short_frame: u64,
    pub drop_not_for_us: u64,
    pub drop_bad_checksum: u64,
    pub drop_unknown_ethertype: u64,
    pub drop_malformed_arp: u64,
    pub drop_malformed_ip: u64,
    pub drop_unknown_protocol: u64,
    pub drop_malformed_udp: u64,
    pub drop_no_listener: u64,
}

/// 네트워크 스택 전체 상태
pub struct NetworkStack<D> {
    pub(super) device: Option<D>,
    pub(super) mac: MacAddress,
    pub(super) ip: Ipv4Address,
    /// IPv4 identification 카운터 (16비트에서 순환)
    pub(super) ip_id: u16,
    pub(super) arp: ArpCache,
    pub(super) sockets: SocketTable<D>,
    pub(super) dhcp: DhcpClient,
    pub(super) echo: EchoMailbox,
    pub(super) stats: NetStats,
    /// 마지막으로 틱에서 프레임을 처리한 시점의 전역 틱 값
    last_tick_poll: u64,
    pub(super) config: NetConfig,
}

impl<D> NetworkStack<D> {
    pub const fn new(config: NetConfig) -> Self {
        Self {
            device: None,
            mac: MacAddress::ZERO,
            ip: Ipv4Address::UNSPECIFIED,
            ip_id: 0,
            arp: ArpCache::new(),
            sockets: SocketTable::new(),
            dhcp: DhcpClient::new(),
            echo: EchoMailbox::new(),
            stats: NetStats {
                process_calls: 0,
                frames_received: 0,
                driver_polls: 0,
                driver_empty_polls: 0,
                udp_packets: 0,
                udp_callbacks: 0,
                frames_sent: 0,
                send_errors: 0,
                drop_short_frame: 0,
                drop_not_for_us: 0,
                drop_bad_checksum: 0,
                drop_unknown_ethertype: 0,
                drop_malformed_arp: 0,
                drop_malformed_ip: 0,
                drop_unknown_protocol: 0,
                drop_malformed_udp: 0,
                drop_no_listener: 0,
            },
            last_tick_poll: 0,
            config,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Address {
        self.ip
    }

    /// 수동 지정 또는 DHCP ACK로 주소 변경
    pub fn set_ip(&mut self, ip: Ipv4Address) {
        self.ip = ip;
        crate::log_info!("net: IPv4 address set to {}", ip);
    }

    pub fn stats(&self) -> &NetStats {
        &self.stats
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp
    }

    pub fn dhcp_state(&self) -> DhcpState {
        self.dhcp.state()
    }

    pub fn sockets(&self) -> &SocketTable<D> {
        &self.sockets
    }

    pub fn echo_mailbox(&mut self) -> &mut EchoMailbox {
        &mut self.echo
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut D> {
        self.device.as_mut()
    }
}

impl<D: EthernetDriver> NetworkStack<D> {
    /// 초기화된 드라이버를 붙이고 MAC을 가져옴
    pub fn init(&mut self, device: D) -> Result<(), NetworkError> {
        if self.is_initialized() {
            crate::log_warn!("net: already initialized, ignoring {}", device.name());
            return Ok(());
        }
        self.mac = device.mac_address();
        crate::log_info!("net: {} attached, MAC {}", device.name(), self.mac);
        self.device = Some(device);
        Ok(())
    }

    /// 완성된 이더넷 프레임 송신
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetworkError> {
        let device = self.device.as_mut().ok_or(NetworkError::NotInitialized)?;
        match device.send_frame(frame) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.send_errors += 1;
                crate::log_debug!("net: send failed: {}", err);
                Err(err)
            }
        }
    }

    /// 드라이버 수신 링이 빌 때까지 프레임을 꺼내 처리
    pub fn process_frames(&mut self) {
        self.stats.process_calls += 1;
        let mut frame = [0u8; MAX_FRAME_SIZE];

        loop {
            let Some(device) = self.device.as_mut() else {
                return;
            };
            self.stats.driver_polls += 1;
            let len = device.receive_frame(&mut frame);
            if len == 0 {
                self.stats.driver_empty_polls += 1;
                return;
            }
            self.stats.frames_received += 1;
            self.handle_frame(&frame[..len]);
        }
    }

    /// 프레임 하나 분류/전달
    fn handle_frame(&mut self, frame: &[u8]) {
        let Some(header) = EthernetHeader::parse(frame) else {
            self.stats.drop_short_frame += 1;
            return;
        };
        if !header.destination.is_broadcast() && header.destination != self.mac {
            self.stats.drop_not_for_us += 1;
            return;
        }

        let payload = &frame[EthernetHeader::SIZE..];
        match header.ether_type {
            EtherType::Arp => {
                if payload.len() < ArpPacket::SIZE {
                    self.stats.drop_malformed_arp += 1;
                    return;
                }
                self.arp_process(payload);
            }
            EtherType::Ipv4 => {
                if payload.len() < Ipv4Header::SIZE {
                    self.stats.drop_malformed_ip += 1;
                    return;
                }
                if !ip::verify_header_checksum(payload) {
                    crate::log_trace!("net: IPv4 checksum mismatch");
                    self.stats.drop_bad_checksum += 1;
                    return;
                }
                let destination = Ipv4Address::from_slice(&payload[16..20]);
                // 첫 옥텟 255는 브로드캐스트로 취급
                if destination != self.ip && destination.0[0] != 255 {
                    self.stats.drop_not_for_us += 1;
                    return;
                }
                self.ipv4_process(payload);
            }
            EtherType::Unknown(value) => {
                crate::log_trace!("net: dropping ethertype {:#06x}", value);
                self.stats.drop_unknown_ethertype += 1;
            }
        }
    }

    /// 타이머 틱 훅에서 호출. `now`는 타이머의 전역 틱 카운터
    ///
    /// 마지막 처리 이후 `tick_interval`틱 이상 지났으면 프레임을 처리합니다.
    /// 스택이 잠겨 있어 훅이 건너뛴 틱도 `now`에는 반영되어 있으므로 주기가 늘어나지 않습니다.
    pub fn on_tick(&mut self, now: u64) {
        let interval = u64::from(self.config.tick_interval);
        if interval == 0 || !self.is_initialized() {
            return;
        }
        if now.wrapping_sub(self.last_tick_poll) >= interval {
            self.last_tick_poll = now;
            self.process_frames();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::arp::ArpOperation;
    use crate::net::testing::{self, FakeDriver};

    const PEER_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    #[test]
    fn uninitialized_stack_is_inert() {
        let mut stack = NetworkStack::<FakeDriver>::new(NetConfig::DEFAULT);
        stack.process_frames();
        assert_eq!(stack.stats().process_calls, 1);
        assert_eq!(stack.stats().driver_polls, 0);
        assert_eq!(stack.send_frame(&[0; 60]), Err(NetworkError::NotInitialized));
        assert_eq!(
            stack.ipv4_send(Ipv4Address::new(10, 0, 2, 2), crate::net::IpProtocol::Udp, b"x"),
            Err(NetworkError::NotInitialized)
        );
    }

    #[test]
    fn init_takes_mac_from_device() {
        let stack = testing::stack_with_ip([0, 0, 0, 0]);
        assert!(stack.is_initialized());
        assert_eq!(stack.mac(), testing::OUR_MAC);
    }

    #[test]
    fn short_and_foreign_frames_are_dropped() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let device = stack.device_mut().unwrap();
        device.inject(&[0u8; 10]);
        let mut foreign = testing::ipv4_udp_frame(
            PEER_MAC,
            Ipv4Address::new(10, 0, 2, 2),
            Ipv4Address::new(10, 0, 2, 15),
            1,
            2,
            b"x",
        );
        foreign[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x99]);
        device.inject(&foreign);

        stack.process_frames();
        let stats = stack.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.drop_short_frame, 1);
        assert_eq!(stats.drop_not_for_us, 1);
        assert_eq!(stats.driver_empty_polls, 1);
    }

    #[test]
    fn bad_ip_checksum_is_dropped() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let mut frame = testing::ipv4_udp_frame(
            PEER_MAC,
            Ipv4Address::new(10, 0, 2, 2),
            Ipv4Address::new(10, 0, 2, 15),
            1,
            2,
            b"x",
        );
        frame[14 + 8] ^= 0xFF;
        stack.device_mut().unwrap().inject(&frame);
        stack.process_frames();
        assert_eq!(stack.stats().drop_bad_checksum, 1);
    }

    #[test]
    fn ip_for_another_host_is_dropped_but_broadcast_accepted() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let device = stack.device_mut().unwrap();
        device.inject(&testing::ipv4_udp_frame(
            PEER_MAC,
            Ipv4Address::new(10, 0, 2, 2),
            Ipv4Address::new(10, 0, 2, 99),
            1,
            2,
            b"x",
        ));
        device.inject(&testing::ipv4_udp_frame(
            PEER_MAC,
            Ipv4Address::new(10, 0, 2, 2),
            Ipv4Address::BROADCAST,
            1,
            2,
            b"x",
        ));
        stack.process_frames();
        assert_eq!(stack.stats().drop_not_for_us, 1);
        assert_eq!(stack.stats().udp_packets, 1);
        assert_eq!(stack.stats().drop_no_listener, 1);
    }

    #[test]
    fn unknown_ethertype_is_counted() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let mut frame = [0u8; 60];
        EthernetHeader {
            destination: testing::OUR_MAC,
            source: PEER_MAC,
            ether_type: EtherType::Unknown(0x86DD),
        }
        .write_to(&mut frame);
        stack.device_mut().unwrap().inject(&frame);
        stack.process_frames();
        assert_eq!(stack.stats().drop_unknown_ethertype, 1);
    }

    #[test]
    fn arp_reply_resolves_without_new_request() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let gateway = Ipv4Address::new(10, 0, 2, 2);

        assert_eq!(stack.arp_lookup(gateway), None);
        let sent = stack.device_mut().unwrap().take_sent();
        assert_eq!(sent.len(), 1);
        let request = ArpPacket::parse(&sent[0][14..]).unwrap();
        assert_eq!(&sent[0][0..6], &[0xFF; 6]);
        assert_eq!(request.operation, ArpOperation::Request);
        assert_eq!(request.target_ip, gateway);

        let reply = testing::arp_frame(
            ArpOperation::Reply,
            PEER_MAC,
            gateway,
            testing::OUR_MAC,
            Ipv4Address::new(10, 0, 2, 15),
        );
        stack.device_mut().unwrap().inject(&reply);
        stack.process_frames();

        assert_eq!(stack.arp_lookup(gateway), Some(PEER_MAC));
        assert!(stack.device_mut().unwrap().take_sent().is_empty());
    }

    #[test]
    fn arp_request_for_our_ip_gets_reply() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let request = testing::arp_frame(
            ArpOperation::Request,
            PEER_MAC,
            Ipv4Address::new(10, 0, 2, 2),
            MacAddress::ZERO,
            Ipv4Address::new(10, 0, 2, 15),
        );
        stack.device_mut().unwrap().inject(&request);
        stack.process_frames();

        let sent = stack.device_mut().unwrap().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][0..6], &PEER_MAC.0);
        let reply = ArpPacket::parse(&sent[0][14..]).unwrap();
        assert_eq!(reply.operation, ArpOperation::Reply);
        assert_eq!(reply.sender_mac, testing::OUR_MAC);
        assert_eq!(reply.sender_ip, Ipv4Address::new(10, 0, 2, 15));
        assert_eq!(reply.target_mac, PEER_MAC);
        assert_eq!(reply.target_ip, Ipv4Address::new(10, 0, 2, 2));
        // 요청자도 학습됨
        assert_eq!(stack.arp_cache().lookup(Ipv4Address::new(10, 0, 2, 2)), Some(PEER_MAC));
    }

    #[test]
    fn arp_request_for_other_ip_is_learned_but_not_answered() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        let request = testing::arp_frame(
            ArpOperation::Request,
            PEER_MAC,
            Ipv4Address::new(10, 0, 2, 2),
            MacAddress::ZERO,
            Ipv4Address::new(10, 0, 2, 3),
        );
        stack.device_mut().unwrap().inject(&request);
        stack.process_frames();
        assert!(stack.device_mut().unwrap().take_sent().is_empty());
        assert_eq!(stack.arp_cache().len(), 1);
    }

    #[test]
    fn ipv4_send_builds_header_and_falls_back_to_broadcast() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        stack
            .ipv4_send(Ipv4Address::new(10, 0, 2, 2), crate::net::IpProtocol::Udp, b"abc")
            .unwrap();
        stack
            .ipv4_send(Ipv4Address::new(10, 0, 2, 2), crate::net::IpProtocol::Udp, b"abc")
            .unwrap();
        let sent = stack.device_mut().unwrap().take_sent();
        // ARP 요청, IP, ARP 요청, IP
        assert_eq!(sent.len(), 4);
        let first = &sent[1];
        let second = &sent[3];
        assert_eq!(&first[0..6], &[0xFF; 6]);
        assert_eq!(&first[12..14], &[0x08, 0x00]);

        let h1 = Ipv4Header::parse(&first[14..]).unwrap();
        let h2 = Ipv4Header::parse(&second[14..]).unwrap();
        assert_eq!(h1.total_len, 23);
        assert_eq!(h1.ttl, 64);
        assert_eq!(h2.identification, h1.identification.wrapping_add(1));
        assert!(ip::verify_header_checksum(&first[14..]));
        assert_eq!(&first[34..37], b"abc");
    }

    #[test]
    fn ip_id_wraps_at_sixteen_bits() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        stack.ip_id = u16::MAX;
        stack
            .ipv4_send(Ipv4Address::BROADCAST, crate::net::IpProtocol::Udp, b"")
            .unwrap();
        assert_eq!(stack.ip_id, 0);
    }

    #[test]
    fn every_tenth_tick_processes_frames() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        for now in 1..10 {
            stack.on_tick(now);
        }
        assert_eq!(stack.stats().process_calls, 0);
        stack.on_tick(10);
        assert_eq!(stack.stats().process_calls, 1);
        for now in 11..=20 {
            stack.on_tick(now);
        }
        assert_eq!(stack.stats().process_calls, 2);
    }

    #[test]
    fn skipped_ticks_do_not_stretch_the_cadence() {
        let mut stack = testing::stack_with_ip([10, 0, 2, 15]);
        stack.on_tick(10);
        assert_eq!(stack.stats().process_calls, 1);

        // 틱 11..=24 동안 스택이 잠겨 훅이 호출되지 않음
        stack.on_tick(25);
        assert_eq!(stack.stats().process_calls, 2);
        stack.on_tick(34);
        assert_eq!(stack.stats().process_calls, 2);
        stack.on_tick(35);
        assert_eq!(stack.stats().process_calls, 3);
    }

    #[test]
    fn ticks_do_nothing_before_init() {
        let mut stack = NetworkStack::<FakeDriver>::new(NetConfig::DEFAULT);
        for now in 1..=30 {
            stack.on_tick(now);
        }
        assert_eq!(stack.stats().process_calls, 0);
    }
}
