//! 명령어 처리 모듈
//!
//! 네트워크 명령어(NETINIT, NETINFO, IPSET, UDPTEST, UDPSEND)와 몇 가지 기본 명령어를 정의합니다.
//! 명령어 이름은 대소문자를 구분하지 않습니다.

use core::fmt::{self, Write};

use crate::drivers::{e1000, timer};
use crate::logging;
use crate::net::{EthernetDriver, Ipv4Address, NetworkError, NetworkStack, NicProbe};

/// UDPSEND 메시지 최대 길이
pub const MAX_MESSAGE_LEN: usize = 200;

/// 명령어 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Uptime,
    Log,
    NetInit,
    NetInfo,
    IpSet(&'a str),
    UdpTest,
    UdpSend(&'a str),
}

impl<'a> Command<'a> {
    /// 입력 한 줄 파싱. 첫 단어가 명령어, 나머지가 인자
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };

        let is = |expected: &str| name.eq_ignore_ascii_case(expected);
        if is("help") || is("h") {
            Some(Command::Help)
        } else if is("uptime") {
            Some(Command::Uptime)
        } else if is("log") || is("dmesg") {
            Some(Command::Log)
        } else if is("netinit") {
            Some(Command::NetInit)
        } else if is("netinfo") {
            Some(Command::NetInfo)
        } else if is("ipset") {
            Some(Command::IpSet(args))
        } else if is("udptest") {
            Some(Command::UdpTest)
        } else if is("udpsend") {
            Some(Command::UdpSend(args))
        } else {
            None
        }
    }

    /// 명령어 실행
    pub fn execute<D, P>(&self, stack: &mut NetworkStack<D>, probe: &mut P, out: &mut dyn Write) -> fmt::Result
    where
        D: EthernetDriver,
        P: NicProbe<D>,
    {
        match *self {
            Command::Help => cmd_help(out),
            Command::Uptime => cmd_uptime(out),
            Command::Log => logging::dump_recent(out),
            Command::NetInit => cmd_netinit(stack, probe, out),
            Command::NetInfo => cmd_netinfo(stack, out),
            Command::IpSet(args) => cmd_ipset(stack, args, out),
            Command::UdpTest => cmd_udptest(stack, out),
            Command::UdpSend(args) => cmd_udpsend(stack, args, out),
        }
    }
}

fn cmd_help(out: &mut dyn Write) -> fmt::Result {
    writeln!(out, "Available commands:")?;
    writeln!(out, "  help                       - Show this help message")?;
    writeln!(out, "  uptime                     - Show system uptime")?;
    writeln!(out, "  log                        - Show recent kernel log")?;
    writeln!(out, "  NETINIT                    - Find and initialize the network card")?;
    writeln!(out, "  NETINFO                    - Show MAC/IP address and network counters")?;
    writeln!(out, "  IPSET <ip>                 - Set the IPv4 address")?;
    writeln!(out, "  UDPTEST                    - Start the UDP echo server")?;
    writeln!(out, "  UDPSEND <ip> <port> <msg>  - Send a UDP datagram")
}

/// uptime 명령어: 시스템 업타임 표시
fn cmd_uptime(out: &mut dyn Write) -> fmt::Result {
    let ms = timer::milliseconds();
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        writeln!(out, "Uptime: {}h {}m {}s ({} ms)", hours, minutes % 60, seconds % 60, ms)
    } else if minutes > 0 {
        writeln!(out, "Uptime: {}m {}s ({} ms)", minutes, seconds % 60, ms)
    } else {
        writeln!(out, "Uptime: {}s ({} ms)", seconds, ms)
    }
}

fn require_init<D>(stack: &NetworkStack<D>, out: &mut dyn Write) -> Result<bool, fmt::Error> {
    if stack.is_initialized() {
        return Ok(true);
    }
    writeln!(out, "Network not initialized. Use NETINIT first.")?;
    Ok(false)
}

/// NETINIT: NIC 탐색/초기화, 설정에 따라 DHCP
fn cmd_netinit<D, P>(stack: &mut NetworkStack<D>, probe: &mut P, out: &mut dyn Write) -> fmt::Result
where
    D: EthernetDriver,
    P: NicProbe<D>,
{
    if stack.is_initialized() {
        return writeln!(out, "Network already initialized");
    }
    writeln!(out, "Initializing network...")?;

    let device = match probe.probe(out) {
        Ok(device) => device,
        Err(NetworkError::DeviceNotFound) => return writeln!(out, "e1000 device not found"),
        Err(err) => {
            crate::log_error!("net: NIC initialization failed: {}", err);
            return writeln!(out, "Network initialization failed: {}", err);
        }
    };
    if let Err(err) = stack.init(device) {
        return writeln!(out, "Network initialization failed: {}", err);
    }
    writeln!(out, "Network initialized successfully")?;

    if stack.config().dhcp_on_init {
        writeln!(out, "Requesting IP address via DHCP...")?;
        match stack.dhcp_acquire() {
            Ok(ip) => writeln!(out, "DHCP: obtained IP address {}", ip)?,
            Err(err) => writeln!(out, "DHCP failed: {}", err)?,
        }
    }
    if stack.ip().is_unspecified() {
        writeln!(out, "Use IPSET to configure IP address (e.g., IPSET 10.0.2.15)")?;
    }
    Ok(())
}

/// NETINFO: 주소와 디버그 카운터
fn cmd_netinfo<D: EthernetDriver>(stack: &NetworkStack<D>, out: &mut dyn Write) -> fmt::Result {
    if !stack.is_initialized() {
        writeln!(out, "Network: Not initialized")?;
        return writeln!(out, "Use NETINIT to initialize the network card");
    }

    writeln!(out, "Network: Initialized")?;
    writeln!(out, "MAC Address: {}", stack.mac())?;
    writeln!(out, "IP Address: {}", stack.ip())?;
    writeln!(out, "ARP cache entries: {}", stack.arp_cache().len())?;

    let stats = stack.stats();
    writeln!(out, "Debug Stats:")?;
    writeln!(out, "  Frames received: {}", stats.frames_received)?;
    writeln!(out, "  Frames sent: {}", stats.frames_sent)?;
    writeln!(out, "  UDP packets received: {}", stats.udp_packets)?;
    writeln!(out, "  UDP callbacks called: {}", stats.udp_callbacks)?;
    writeln!(out, "  Driver receive calls: {}", stats.driver_polls)?;
    writeln!(out, "  Driver receive empty: {}", stats.driver_empty_polls)?;
    writeln!(out, "  process_frames calls: {}", stats.process_calls)?;
    writeln!(out, "  NIC interrupts: {}", e1000::interrupt_count())?;
    writeln!(out, "Dropped:")?;
    writeln!(out, "  short frames: {}", stats.drop_short_frame)?;
    writeln!(out, "  not for us: {}", stats.drop_not_for_us)?;
    writeln!(out, "  bad IP checksum: {}", stats.drop_bad_checksum)?;
    writeln!(out, "  unknown ethertype: {}", stats.drop_unknown_ethertype)?;
    writeln!(
        out,
        "  malformed ARP/IP/UDP: {}/{}/{}",
        stats.drop_malformed_arp, stats.drop_malformed_ip, stats.drop_malformed_udp
    )?;
    writeln!(out, "  unknown IP protocol: {}", stats.drop_unknown_protocol)?;
    writeln!(out, "  no UDP listener: {}", stats.drop_no_listener)?;
    writeln!(out, "  send errors: {}", stats.send_errors)
}

/// IPSET <ip>
fn cmd_ipset<D: EthernetDriver>(stack: &mut NetworkStack<D>, args: &str, out: &mut dyn Write) -> fmt::Result {
    if !require_init(stack, out)? {
        return Ok(());
    }
    if args.is_empty() {
        writeln!(out, "Usage: IPSET <ip address>")?;
        return writeln!(out, "Example: IPSET 10.0.2.15");
    }
    let Ok(ip) = args.trim().parse::<Ipv4Address>() else {
        return writeln!(out, "Invalid IP address format");
    };
    stack.set_ip(ip);
    writeln!(out, "IP address set to {}", ip)
}

/// UDPTEST: 에코 서버 시작
fn cmd_udptest<D: EthernetDriver>(stack: &mut NetworkStack<D>, out: &mut dyn Write) -> fmt::Result {
    if !require_init(stack, out)? {
        return Ok(());
    }
    writeln!(out, "Current IP: {}", stack.ip())?;

    let port = stack.config().echo_port;
    if stack.echo_active() {
        return writeln!(out, "UDP test already active on port {}", port);
    }
    match stack.echo_start() {
        Ok(port) => {
            writeln!(out, "UDP echo server started on port {}", port)?;
            writeln!(out, "Listening for packets...")?;
            writeln!(out, "Send UDP packets to this IP:port from another machine")
        }
        Err(err) => writeln!(out, "Failed to register UDP callback: {}", err),
    }
}

/// UDPSEND <ip> <port> <message>
fn cmd_udpsend<D: EthernetDriver>(stack: &mut NetworkStack<D>, args: &str, out: &mut dyn Write) -> fmt::Result {
    if !require_init(stack, out)? {
        return Ok(());
    }
    if args.is_empty() {
        writeln!(out, "Usage: UDPSEND <ip> <port> <message>")?;
        return writeln!(out, "Example: UDPSEND 10.0.2.2 12345 hello");
    }

    let (ip, rest) = args.split_once(' ').unwrap_or((args, ""));
    let Ok(destination) = ip.parse::<Ipv4Address>() else {
        return writeln!(out, "Invalid IP address format");
    };
    let rest = rest.trim_start();
    let (port, message) = rest.split_once(' ').unwrap_or((rest, ""));
    let Ok(port) = port.parse::<u16>() else {
        return writeln!(out, "Invalid port number");
    };

    let message = message.trim_start().as_bytes();
    if message.is_empty() {
        return writeln!(out, "No message provided");
    }
    let message = &message[..message.len().min(MAX_MESSAGE_LEN)];

    let source_port = stack.config().udpsend_src_port;
    match stack.udp_send(destination, port, source_port, message) {
        Ok(()) => writeln!(out, "UDP packet sent successfully"),
        Err(err) => {
            crate::log_warn!("udp: UDPSEND to {}:{} failed: {}", destination, port, err);
            writeln!(out, "Failed to send UDP packet")
        }
    }
}
