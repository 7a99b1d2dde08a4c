//! 인터럽트 처리 모듈
//!
//! PIC 리매핑, IRQ 라인별 핸들러 테이블, 그리고 (베어메탈 빌드에서) IDT 설정을 담당합니다.

#[cfg(target_os = "none")]
pub mod idt;
pub mod irq;
pub mod pic;

pub use irq::{dispatch, register_handler, unregister_handler, IrqError, IRQ_LINES};
pub use pic::{PIC1_OFFSET, PIC2_OFFSET};
