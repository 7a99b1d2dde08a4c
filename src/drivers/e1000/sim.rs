//! 테스트용 E1000 시뮬레이션
//!
//! `SimRegisters`는 레지스터 파일을 흉내 냅니다. 리셋은 즉시 끝나고 EERD 요청은
//! 바로 완료됩니다. 링 DMA는 `E1000<SimRegisters>`의 `hw_*` 메서드가 하드웨어 대신 수행합니다.

use std::vec;
use std::vec::Vec;

use super::regs::{self, Ctrl, DescStatus, NicRegisters};
use super::ring::{BUFFER_SIZE, FCS_LEN, RING_SIZE};
use super::E1000;

pub struct SimRegisters {
    words: Vec<u32>,
    eeprom: [u16; 3],
    eeprom_enabled: bool,
    reset_held: bool,
    resets: usize,
}

impl SimRegisters {
    /// RAL/RAH에 `mac`을 담은 레지스터 파일
    pub fn new(mac: [u8; 6]) -> Self {
        let mut sim = Self {
            words: vec![0; regs::MMIO_SIZE / 4],
            eeprom: [0xFFFF; 3],
            eeprom_enabled: true,
            reset_held: false,
            resets: 0,
        };
        sim.set(regs::RAL, u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]]));
        sim.set(regs::RAH, u32::from_le_bytes([mac[4], mac[5], 0, 0]));
        sim
    }

    pub fn set_eeprom_mac(&mut self, mac: [u8; 6]) {
        for (word, chunk) in self.eeprom.iter_mut().zip(mac.chunks_exact(2)) {
            *word = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
    }

    /// EERD 요청이 절대 완료되지 않음
    pub fn disable_eeprom(&mut self) {
        self.eeprom_enabled = false;
    }

    /// CTRL.RST가 계속 세워진 채로 남음
    pub fn hold_reset(&mut self) {
        self.reset_held = true;
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    fn get(&self, offset: u32) -> u32 {
        self.words[offset as usize / 4]
    }

    fn set(&mut self, offset: u32, value: u32) {
        self.words[offset as usize / 4] = value;
    }
}

impl NicRegisters for SimRegisters {
    fn read(&self, offset: u32) -> u32 {
        self.get(offset)
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            regs::CTRL => {
                let mut ctrl = Ctrl::from_bits_retain(value);
                if ctrl.contains(Ctrl::RST) {
                    self.resets += 1;
                    if !self.reset_held {
                        ctrl.remove(Ctrl::RST);
                    }
                }
                self.set(offset, ctrl.bits());
            }
            regs::EERD => {
                if !self.eeprom_enabled || value & regs::EERD_START == 0 {
                    self.set(offset, value & !regs::EERD_DONE);
                    return;
                }
                let addr = (value >> regs::EERD_ADDR_SHIFT) & 0xFF;
                let data = self.eeprom.get(addr as usize).copied().unwrap_or(0xFFFF);
                self.set(
                    offset,
                    (data as u32) << regs::EERD_DATA_SHIFT | regs::EERD_DONE | (addr << regs::EERD_ADDR_SHIFT),
                );
            }
            _ => self.set(offset, value),
        }
    }
}

impl E1000<SimRegisters> {
    /// 하드웨어처럼 TDH부터 최대 `count`개의 TX 디스크립터를 끝내고 보낸 프레임을 반환
    pub fn hw_complete_tx(&mut self, count: usize) -> Vec<Vec<u8>> {
        let mut sent = Vec::new();
        let tail = self.regs.get(regs::TDT) as usize;
        let mut head = self.regs.get(regs::TDH) as usize;

        while head != tail && sent.len() < count {
            let desc = &mut self.rings.tx_descriptors[head];
            let len = desc.length() as usize;
            sent.push(self.rings.tx_buffers[head].0[..len].to_vec());
            desc.set_status(DescStatus::DD);
            head = (head + 1) % RING_SIZE;
        }
        self.regs.set(regs::TDH, head as u32);
        sent
    }

    /// 와이어에서 프레임 하나가 도착한 것처럼 RDH 슬롯을 채움. 링이 꽉 차 있으면 false
    pub fn hw_receive(&mut self, frame: &[u8]) -> bool {
        if frame.len() + FCS_LEN > BUFFER_SIZE {
            return false;
        }
        // 하드웨어는 FCS까지 버퍼에 씀
        let mut wire = frame.to_vec();
        wire.extend_from_slice(&[0xEE; FCS_LEN]);
        self.hw_fill_descriptor(&wire, DescStatus::DD | DescStatus::EOP, 0)
    }

    /// RDH 슬롯 하나에 `data`를 그대로 쓰고 status/errors를 세움
    ///
    /// 긴 프레임의 중간 조각(EOP 없음)이나 CRC 오류 프레임을 만들 때 씁니다.
    pub fn hw_fill_descriptor(&mut self, data: &[u8], status: DescStatus, errors: u8) -> bool {
        let head = self.regs.get(regs::RDH) as usize;
        let tail = self.regs.get(regs::RDT) as usize;
        if head == tail || data.len() > BUFFER_SIZE {
            return false;
        }

        self.rings.rx_buffers[head].0[..data.len()].copy_from_slice(data);
        let desc = &mut self.rings.rx_descriptors[head];
        desc.set_length(data.len() as u16);
        desc.set_errors(errors);
        desc.set_status(status);

        self.regs.set(regs::RDH, ((head + 1) % RING_SIZE) as u32);
        true
    }
}
