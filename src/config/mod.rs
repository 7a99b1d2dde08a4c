//! 커널 설정 모듈
//!
//! 컴파일 타임 Cargo feature로 선택되는 설정값들을 모아 둡니다.

pub mod net;

pub use net::{MmioWindow, NetConfig};
