//! Intel 82540EM (E1000) 이더넷 드라이버
//!
//! 레지스터 접근은 `NicRegisters` 뒤에 숨어 있어 같은 드라이버 코드가
//! 실제 MMIO와 시뮬레이션 레지스터 양쪽에서 돌아갑니다.
//!
//! 인터럽트 마스크는 켜지 않습니다. 패킷 이동은 모두 `process_frames()`의 폴링으로 이뤄집니다.

pub mod regs;
pub mod ring;
#[cfg(test)]
pub(crate) mod sim;

use core::fmt;
use core::mem::size_of;
use core::sync::atomic::{fence, AtomicUsize, Ordering};

use crate::config::{MmioWindow, NetConfig};
use crate::drivers::pci::{self, ConfigSpace, PciDevice};
use crate::interrupts::irq;
use crate::net::ethernet::{EthernetDriver, MacAddress, NicProbe};
use crate::net::NetworkError;

use regs::{Ctrl, DescStatus, NicRegisters, Rctl, Tctl, TxCommand};
use ring::{DmaTranslate, RingMemory, RxDescriptor, TxDescriptor, BUFFER_SIZE, FCS_LEN, RING_SIZE};

pub const VENDOR_ID: u16 = 0x8086;
pub const DEVICE_ID_82540EM: u16 = 0x100E;

static IRQ_COUNT: AtomicUsize = AtomicUsize::new(0);

/// NIC IRQ 핸들러. 마스크가 꺼져 있으므로 호출 횟수만 셉니다.
fn on_interrupt() {
    IRQ_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// 지금까지 받은 NIC 인터럽트 수
pub fn interrupt_count() -> usize {
    IRQ_COUNT.load(Ordering::Relaxed)
}

/// E1000 드라이버
pub struct E1000<R: NicRegisters> {
    regs: R,
    rings: &'static mut RingMemory,
    mac: MacAddress,
    /// 하드웨어가 아직 끝내지 않은 첫 TX 디스크립터
    tx_head: usize,
    /// 다음에 채울 TX 디스크립터
    tx_tail: usize,
    /// 마지막으로 소프트웨어가 돌려준 RX 디스크립터
    rx_tail: usize,
    /// EOP 없이 끝난 디스크립터 뒤의 나머지 조각을 버리는 중
    rx_discarding: bool,
    /// 버린 RX 디스크립터 수
    rx_discarded: u64,
    irq_line: u8,
}

impl<R: NicRegisters> E1000<R> {
    pub fn new(regs: R, rings: &'static mut RingMemory) -> Self {
        Self {
            regs,
            rings,
            mac: MacAddress::ZERO,
            tx_head: 0,
            tx_tail: 0,
            rx_tail: RING_SIZE - 1,
            rx_discarding: false,
            rx_discarded: 0,
            irq_line: 0,
        }
    }

    /// 디바이스 리셋부터 링크 업까지
    ///
    /// 실패해도 링 메모리는 `into_rings`로 회수할 수 있습니다.
    pub fn init<T: DmaTranslate>(&mut self, dma: &T, config: &NetConfig) -> Result<(), NetworkError> {
        let status = self.regs.read(regs::STATUS);
        crate::log_debug!("e1000: STATUS = {:#010x}", status);

        self.reset(config.reset_spin_limit)?;
        self.mac = self.read_mac_address(config.eeprom_spin_limit);

        // 인터럽트는 모두 마스크하고 대기 중인 원인은 읽어서 지움
        self.regs.write(regs::IMC, 0xFFFF_FFFF);
        let _ = self.regs.read(regs::ICR);

        self.init_tx(dma)?;
        self.init_rx(dma)?;

        let ctrl = Ctrl::from_bits_retain(self.regs.read(regs::CTRL));
        self.regs.write(regs::CTRL, (ctrl | Ctrl::SLU).bits());

        crate::log_info!("e1000: initialized, MAC {}", self.mac);
        Ok(())
    }

    fn reset(&mut self, spin_limit: u32) -> Result<(), NetworkError> {
        let ctrl = Ctrl::from_bits_retain(self.regs.read(regs::CTRL));
        if ctrl.contains(Ctrl::RST) {
            // 이미 리셋 진행 중
            return Ok(());
        }
        self.regs.write(regs::CTRL, (ctrl | Ctrl::RST).bits());

        for _ in 0..spin_limit {
            if !Ctrl::from_bits_retain(self.regs.read(regs::CTRL)).contains(Ctrl::RST) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        crate::log_error!("e1000: reset did not complete after {} polls", spin_limit);
        Err(NetworkError::ResetTimeout)
    }

    /// RAL/RAH 우선, 값이 비어 있으면 EEPROM. EEPROM도 실패하면 레지스터 값을 그대로 사용
    fn read_mac_address(&mut self, eeprom_spin_limit: u32) -> MacAddress {
        let ral = self.regs.read(regs::RAL);
        let rah = self.regs.read(regs::RAH);
        let from_registers = mac_from_receive_address(ral, rah);

        let blank = (ral == 0 && rah == 0) || (ral == 0xFFFF_FFFF && rah & 0xFFFF == 0xFFFF);
        if !blank {
            return from_registers;
        }

        match self.read_mac_from_eeprom(eeprom_spin_limit) {
            Ok(mac) => {
                crate::log_debug!("e1000: MAC read from EEPROM");
                mac
            }
            Err(err) => {
                crate::log_warn!("e1000: {}, using receive address registers", err);
                from_registers
            }
        }
    }

    fn read_mac_from_eeprom(&mut self, spin_limit: u32) -> Result<MacAddress, NetworkError> {
        let mut bytes = [0u8; 6];
        for (word, chunk) in bytes.chunks_exact_mut(2).enumerate() {
            let value = self.read_eeprom(word as u8, spin_limit)?;
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(MacAddress(bytes))
    }

    fn read_eeprom(&mut self, offset: u8, spin_limit: u32) -> Result<u16, NetworkError> {
        self.regs.write(
            regs::EERD,
            ((offset as u32) << regs::EERD_ADDR_SHIFT) | regs::EERD_START,
        );
        for _ in 0..spin_limit {
            let eerd = self.regs.read(regs::EERD);
            if eerd & regs::EERD_DONE != 0 {
                return Ok((eerd >> regs::EERD_DATA_SHIFT) as u16);
            }
            core::hint::spin_loop();
        }
        Err(NetworkError::EepromTimeout)
    }

    fn init_tx<T: DmaTranslate>(&mut self, dma: &T) -> Result<(), NetworkError> {
        for (desc, buf) in self
            .rings
            .tx_descriptors
            .iter_mut()
            .zip(self.rings.tx_buffers.iter())
        {
            *desc = TxDescriptor {
                buffer_addr: dma_address(dma, buf.0.as_ptr() as usize)?,
                ..TxDescriptor::default()
            };
        }
        let base = dma_address(dma, self.rings.tx_descriptors.as_ptr() as usize)?;

        self.regs.write(regs::TDBAL, base as u32);
        self.regs.write(regs::TDBAH, (base >> 32) as u32);
        self.regs.write(regs::TDLEN, (RING_SIZE * size_of::<TxDescriptor>()) as u32);
        self.regs.write(regs::TDH, 0);
        self.regs.write(regs::TDT, 0);
        self.tx_head = 0;
        self.tx_tail = 0;

        let tctl = Tctl::EN | Tctl::PSP | Tctl::CT_DEFAULT | Tctl::COLD_DEFAULT;
        self.regs.write(regs::TCTL, tctl.bits());
        self.regs.write(regs::TIPG, regs::TIPG_DEFAULT);
        Ok(())
    }

    fn init_rx<T: DmaTranslate>(&mut self, dma: &T) -> Result<(), NetworkError> {
        for (desc, buf) in self
            .rings
            .rx_descriptors
            .iter_mut()
            .zip(self.rings.rx_buffers.iter())
        {
            *desc = RxDescriptor {
                buffer_addr: dma_address(dma, buf.0.as_ptr() as usize)?,
                ..RxDescriptor::default()
            };
        }
        let base = dma_address(dma, self.rings.rx_descriptors.as_ptr() as usize)?;

        self.regs.write(regs::RDBAL, base as u32);
        self.regs.write(regs::RDBAH, (base >> 32) as u32);
        self.regs.write(regs::RDLEN, (RING_SIZE * size_of::<RxDescriptor>()) as u32);
        self.regs.write(regs::RDH, 0);
        self.rx_tail = RING_SIZE - 1;
        self.rx_discarding = false;
        fence(Ordering::Release);
        self.regs.write(regs::RDT, self.rx_tail as u32);

        let rctl = Rctl::EN | Rctl::SBP | Rctl::UPE | Rctl::MPE | Rctl::LPE | Rctl::BAM;
        self.regs.write(regs::RCTL, rctl.bits());
        Ok(())
    }

    /// 하드웨어가 끝낸 TX 디스크립터 회수
    fn reclaim_tx(&mut self) {
        while self.tx_head != self.tx_tail {
            let desc = &mut self.rings.tx_descriptors[self.tx_head];
            if !desc.status().contains(DescStatus::DD) {
                break;
            }
            fence(Ordering::Acquire);
            desc.set_status(DescStatus::empty());
            self.tx_head = (self.tx_head + 1) % RING_SIZE;
        }
    }

    /// 프레임 하나 전송 큐잉
    pub fn transmit(&mut self, data: &[u8]) -> Result<(), NetworkError> {
        if data.len() > BUFFER_SIZE {
            return Err(NetworkError::FrameTooLarge);
        }
        self.reclaim_tx();

        let next = (self.tx_tail + 1) % RING_SIZE;
        if next == self.tx_head {
            return Err(NetworkError::RingFull);
        }

        let slot = self.tx_tail;
        self.rings.tx_buffers[slot].0[..data.len()].copy_from_slice(data);
        let desc = &mut self.rings.tx_descriptors[slot];
        desc.set_length(data.len() as u16);
        desc.set_command(TxCommand::EOP | TxCommand::IFCS | TxCommand::RS);
        desc.set_status(DescStatus::empty());

        self.tx_tail = next;
        // 버퍼와 디스크립터가 모두 보인 뒤에 테일을 넘김. 테일 쓰기가 전송을 시작시킴
        fence(Ordering::Release);
        self.regs.write(regs::TDT, self.tx_tail as u32);
        Ok(())
    }

    /// 수신된 프레임 하나를 `buffer`로 복사. 없으면 0
    ///
    /// 여러 디스크립터에 걸친 프레임과 오류 비트가 선 프레임은 EOP까지 통째로 버립니다.
    pub fn receive(&mut self, buffer: &mut [u8]) -> usize {
        loop {
            let next = (self.rx_tail + 1) % RING_SIZE;
            if self.regs.read(regs::RDH) as usize == next {
                return 0;
            }

            let desc = &self.rings.rx_descriptors[next];
            let status = desc.status();
            if !status.contains(DescStatus::DD) {
                return 0;
            }
            // DD를 본 뒤에 길이와 버퍼를 읽어야 함
            fence(Ordering::Acquire);

            let end_of_packet = status.contains(DescStatus::EOP);
            let errors = desc.errors();
            let mut delivered = 0;
            if self.rx_discarding || !end_of_packet || errors != 0 {
                crate::log_trace!(
                    "e1000: discarding rx descriptor {} (status {:#04x}, errors {:#04x})",
                    next,
                    status.bits(),
                    errors
                );
                self.rx_discarded += 1;
                self.rx_discarding = !end_of_packet;
            } else {
                delivered = (desc.length() as usize)
                    .saturating_sub(FCS_LEN)
                    .min(BUFFER_SIZE)
                    .min(buffer.len());
                buffer[..delivered].copy_from_slice(&self.rings.rx_buffers[next].0[..delivered]);
            }

            self.release_rx(next);
            if delivered > 0 {
                return delivered;
            }
        }
    }

    /// RX 디스크립터를 비우고 하드웨어에 돌려줌
    fn release_rx(&mut self, slot: usize) {
        let desc = &mut self.rings.rx_descriptors[slot];
        desc.set_status(DescStatus::empty());
        desc.set_errors(0);
        desc.set_length(0);
        self.rx_tail = slot;
        // 버퍼 복사가 끝난 뒤에 슬롯을 돌려줌
        fence(Ordering::Release);
        self.regs.write(regs::RDT, self.rx_tail as u32);
    }

    /// 조각난 프레임이나 오류 때문에 버린 RX 디스크립터 수
    pub fn rx_discarded(&self) -> u64 {
        self.rx_discarded
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn irq_line(&self) -> u8 {
        self.irq_line
    }

    /// IRQ 핸들러 등록 (라인 0과 16 이상은 건너뜀)
    pub fn attach_irq(&mut self, line: u8) {
        self.irq_line = line;
        if line == 0 || line as usize >= irq::IRQ_LINES {
            crate::log_debug!("e1000: no usable IRQ line ({})", line);
            return;
        }
        if let Err(err) = irq::register_handler(line, on_interrupt) {
            crate::log_warn!("e1000: {}", err);
        }
    }

    /// 드라이버를 해체하고 링 메모리를 돌려받음
    pub fn into_rings(self) -> &'static mut RingMemory {
        self.rings
    }
}

fn mac_from_receive_address(ral: u32, rah: u32) -> MacAddress {
    let low = ral.to_le_bytes();
    let high = rah.to_le_bytes();
    MacAddress([low[0], low[1], low[2], low[3], high[0], high[1]])
}

fn dma_address<T: DmaTranslate>(dma: &T, virt: usize) -> Result<u64, NetworkError> {
    dma.physical_address(virt).ok_or(NetworkError::MmioNotMapped)
}

impl<R: NicRegisters> EthernetDriver for E1000<R> {
    fn name(&self) -> &str {
        "e1000"
    }

    fn mac_address(&self) -> MacAddress {
        self.mac
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetworkError> {
        self.transmit(frame)
    }

    fn receive_frame(&mut self, buffer: &mut [u8]) -> usize {
        self.receive(buffer)
    }
}

/// PCI 쪽 준비: BAR 검증 후 Bus-Master/Memory-Space 활성화. MMIO 물리 베이스 반환
pub fn prepare_device<C: ConfigSpace>(
    config: &mut C,
    device: &PciDevice,
    windows: &[MmioWindow],
) -> Result<u64, NetworkError> {
    let base = pci::validate_bar(device.bar0, windows)?;
    device.enable_bus_master(config);
    Ok(base)
}

/// NETINIT용 E1000 탐색기
///
/// `map_registers`는 MMIO 물리 베이스를 받아 레지스터 접근자를 만듭니다.
pub struct E1000Probe<C, T, F> {
    config_space: C,
    dma: T,
    map_registers: F,
    rings: Option<&'static mut RingMemory>,
    settings: NetConfig,
}

impl<C, T, F> E1000Probe<C, T, F> {
    pub fn new(
        config_space: C,
        dma: T,
        map_registers: F,
        rings: &'static mut RingMemory,
        settings: NetConfig,
    ) -> Self {
        Self {
            config_space,
            dma,
            map_registers,
            rings: Some(rings),
            settings,
        }
    }
}

impl<C, T, R, F> NicProbe<E1000<R>> for E1000Probe<C, T, F>
where
    C: ConfigSpace,
    T: DmaTranslate,
    R: NicRegisters,
    F: FnMut(u64) -> R,
{
    fn probe(&mut self, out: &mut dyn fmt::Write) -> Result<E1000<R>, NetworkError> {
        let Some(device) = pci::find_device(&mut self.config_space, VENDOR_ID, DEVICE_ID_82540EM) else {
            if let Some(other) =
                pci::find_by_class(&mut self.config_space, pci::PCI_CLASS_NETWORK, pci::PCI_SUBCLASS_ETHERNET)
            {
                let _ = writeln!(
                    out,
                    "Unsupported Ethernet controller {:04x}:{:04x}",
                    other.vendor_id, other.device_id
                );
            }
            return Err(NetworkError::DeviceNotFound);
        };
        let _ = writeln!(
            out,
            "Found e1000 device at {:02x}:{:02x}.{}",
            device.bus, device.device, device.function
        );

        let base = (device.bar0 & !0xF) as u64;
        let _ = writeln!(out, "BAR0: {:#010x}", device.bar0);
        let _ = writeln!(out, "MMIO base: {:#x}", base);
        if self.settings.is_mapped(base) {
            let _ = writeln!(out, "MMIO address is in mapped range");
        } else {
            let _ = writeln!(out, "Warning: MMIO address is outside the mapped range");
        }

        let base = prepare_device(&mut self.config_space, &device, &self.settings.mmio_windows)?;
        let rings = self.rings.take().ok_or(NetworkError::DeviceNotFound)?;

        let mut nic = E1000::new((self.map_registers)(base), rings);
        if let Err(err) = nic.init(&self.dma, &self.settings) {
            self.rings = Some(nic.into_rings());
            return Err(err);
        }
        nic.attach_irq(device.interrupt_line);
        Ok(nic)
    }
}
