//! Simple Net OS Kernel Library
//!
//! 이 모듈은 커널 라이브러리 루트입니다.
//! E1000 NIC 드라이버와 폴링 기반 네트워크 스택(ARP, IPv4, UDP, DHCP),
//! 그리고 이를 다루는 셸 명령어가 여기서 export됩니다.

#![no_std]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod drivers;
pub mod interrupts;
pub mod logging;
pub mod memory;
pub mod net;
pub mod shell;

// 매크로는 자동으로 crate 루트에 사용 가능하므로 재export 불필요
// 사용: simple_net_os::serial_println!() 또는 simple_net_os::log_info!()
