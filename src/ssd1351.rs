//! SSD1351 128x128 OLED on spidev, driven as an RGB16PC drawable. The panel's
//! native memory is a shadow of its GRAM that is pushed over SPI on unlock.

use std::io::Write;
use std::thread;
use std::time::Duration;

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use log::{debug, warn};
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use thiserror::Error;

use crate::config::PanelConfig;
use crate::drawable::{Drawable, PixelFormat, SUPPORTED_DEPTH, SUPPORTED_FORMAT};
use crate::framebuffer::BYTES_PER_PIXEL;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Spi(#[from] std::io::Error),

    #[error(transparent)]
    Gpio(#[from] gpio_cdev::Error),
}

/// Largest single write spidev accepts with the default bufsiz.
const SPI_CHUNK: usize = 4096;

enum Command {
    SetColumnAddress(u8, u8),
    SetRowAddress(u8, u8),
    WriteRam,
    SetReMapColorDepth {
        vertical_address_increment: bool,
        column_address_127_to_seg0: bool,
        color_swapped: bool,
        com_scan_reversed: bool,
        com_split: bool,
    },
    SetDisplayStartLine(u8),
    SetDisplayOffset(u8),
    SetDisplayModeNormal,
    SetSleepModeOn,
    SetSleepModeOff,
    FrontClockDivOscilatorFreq {
        front_clk_div: FrontClockDiv,
        oscilator_freq: u8,
    },
    SetCommandLock(McuProtection),
}

#[derive(Debug, Clone, Copy)]
pub enum FrontClockDiv {
    Div1 = 0,
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
    Div512,
    Div1024,
}

#[derive(Debug, Clone, Copy)]
enum McuProtection {
    Unlock = 0x12,
    AdditionalCommandsAccessible = 0xb1,
}

impl Command {
    fn encode(&self) -> (u8, Vec<u8>) {
        match *self {
            Command::SetColumnAddress(start, end) => (0x15, vec![start, end]),
            Command::SetRowAddress(start, end) => (0x75, vec![start, end]),
            Command::WriteRam => (0x5c, Vec::new()),
            Command::SetReMapColorDepth {
                vertical_address_increment,
                column_address_127_to_seg0,
                color_swapped,
                com_scan_reversed,
                com_split,
            } => {
                // 65k colour depth lives in bits 7:6
                let mut value = 0b0100_0000;
                value |= vertical_address_increment as u8;
                value |= (column_address_127_to_seg0 as u8) << 1;
                value |= (color_swapped as u8) << 2;
                value |= (com_scan_reversed as u8) << 4;
                value |= (com_split as u8) << 5;
                (0xa0, vec![value])
            }
            Command::SetDisplayStartLine(line) => (0xa1, vec![line]),
            Command::SetDisplayOffset(offset) => (0xa2, vec![offset]),
            Command::SetDisplayModeNormal => (0xa6, Vec::new()),
            Command::SetSleepModeOn => (0xae, Vec::new()),
            Command::SetSleepModeOff => (0xaf, Vec::new()),
            Command::FrontClockDivOscilatorFreq { front_clk_div, oscilator_freq } => {
                (0xb3, vec![front_clk_div as u8 | ((oscilator_freq & 0b1111) << 4)])
            }
            Command::SetCommandLock(prot) => (0xfd, vec![prot as u8]),
        }
    }
}

/// RGB16PC words are little-endian RGB565; the controller wants big-endian.
fn to_wire(gram: &[u8], wire: &mut [u8]) {
    for (dst, src) in wire.chunks_exact_mut(2).zip(gram.chunks_exact(2)) {
        dst[0] = src[1];
        dst[1] = src[0];
    }
}

pub struct Ssd1351 {
    spi: Spidev,
    dc: LineHandle,
    rst: LineHandle,
    width: u32,
    height: u32,
    gram: Vec<u8>,
    wire: Vec<u8>,
    locked: bool,
    faulted: bool,
}

impl Ssd1351 {
    pub fn open(config: &PanelConfig) -> Result<Self, TransferError> {
        let mut chip = Chip::new(&config.gpio_chip)?;
        let rst = chip
            .get_line(config.rst_line)?
            .request(LineRequestFlags::OUTPUT, 0, "oled-reset")?;
        let dc = chip
            .get_line(config.dc_line)?
            .request(LineRequestFlags::OUTPUT, 0, "oled-dc")?;

        let mut spi = Spidev::open(&config.spidev)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.max_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;

        let len = (config.width * config.height * BYTES_PER_PIXEL) as usize;
        let mut panel = Ssd1351 {
            spi,
            dc,
            rst,
            width: config.width,
            height: config.height,
            gram: vec![0; len],
            wire: vec![0; len],
            locked: false,
            faulted: false,
        };
        panel.recover()?;

        debug!(target: "rgb16pc::ssd1351", "panel up on {}", config.spidev);
        Ok(panel)
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Pulses reset and reprograms the controller, clearing a fault.
    pub fn recover(&mut self) -> Result<(), TransferError> {
        self.rst.set_value(0)?;
        thread::sleep(Duration::from_millis(1));
        self.rst.set_value(1)?;
        thread::sleep(Duration::from_millis(1));

        let init = [
            Command::SetCommandLock(McuProtection::Unlock),
            Command::SetCommandLock(McuProtection::AdditionalCommandsAccessible),
            Command::SetSleepModeOn,
            Command::FrontClockDivOscilatorFreq {
                front_clk_div: FrontClockDiv::Div2,
                oscilator_freq: 0b1111,
            },
            Command::SetReMapColorDepth {
                vertical_address_increment: false,
                column_address_127_to_seg0: false,
                color_swapped: true,
                com_scan_reversed: true,
                com_split: true,
            },
            Command::SetDisplayStartLine(0),
            Command::SetDisplayOffset(0),
            Command::SetDisplayModeNormal,
            Command::SetSleepModeOff,
        ];
        for cmd in init.iter() {
            self.command(cmd)?;
        }

        self.faulted = false;
        Ok(())
    }

    fn command(&mut self, cmd: &Command) -> Result<(), TransferError> {
        let (code, data) = cmd.encode();
        self.dc.set_value(0)?;
        self.spi.write_all(&[code])?;

        if !data.is_empty() {
            self.dc.set_value(1)?;
            self.spi.write_all(&data)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransferError> {
        let last_col = (self.width - 1).min(127) as u8;
        let last_row = (self.height - 1).min(127) as u8;
        self.command(&Command::SetColumnAddress(0, last_col))?;
        self.command(&Command::SetRowAddress(0, last_row))?;
        self.command(&Command::WriteRam)?;

        to_wire(&self.gram, &mut self.wire);
        self.dc.set_value(1)?;
        for chunk in self.wire.chunks(SPI_CHUNK) {
            self.spi.write_all(chunk)?;
        }
        Ok(())
    }
}

impl Drawable for Ssd1351 {
    fn is_direct(&self) -> bool {
        true
    }

    fn depth(&self) -> u32 {
        SUPPORTED_DEPTH
    }

    fn pixel_format(&self) -> PixelFormat {
        SUPPORTED_FORMAT
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn bytes_per_row(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    fn lock(&mut self) -> bool {
        if self.faulted || self.locked {
            return false;
        }
        self.locked = true;
        true
    }

    fn native_memory(&mut self) -> &mut [u8] {
        &mut self.gram
    }

    fn unlock(&mut self) {
        self.locked = false;
        if let Err(err) = self.flush() {
            warn!(target: "rgb16pc::ssd1351", "frame transfer failed, panel faulted: {}", err);
            self.faulted = true;
        }
    }
}
