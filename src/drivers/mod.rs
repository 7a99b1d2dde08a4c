//! 하드웨어 드라이버 모듈
//!
//! 시리얼 콘솔, PIT 타이머, PCI 구성 공간, 그리고 E1000 NIC 드라이버를 포함합니다.

pub mod e1000;
pub mod pci;
pub mod serial;
pub mod timer;
