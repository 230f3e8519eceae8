pub const DEFAULT_SOFTWARE_DEPTH_BITS: u32 = 16;
pub const STENCIL_BITS: u32 = 8;
pub const ACCUM_BITS: u32 = 16;

pub const RENDERER_NAME: &str = "Mesa RGB16PC";

/// Ancillary buffer sizes. These are not derived from the drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualConfig {
    pub depth_bits: u32,
    pub stencil_bits: u32,
    pub accum_bits: u32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        VisualConfig {
            depth_bits: DEFAULT_SOFTWARE_DEPTH_BITS,
            stencil_bits: STENCIL_BITS,
            accum_bits: ACCUM_BITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub visual: VisualConfig,
    pub renderer_name: &'static str,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            visual: VisualConfig::default(),
            renderer_name: RENDERER_NAME,
        }
    }
}

/// Wiring of an SSD1351 panel on a Raspberry Pi.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub spidev: String,
    pub gpio_chip: String,
    pub rst_line: u32,
    pub dc_line: u32,
    pub max_speed_hz: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            spidev: "/dev/spidev0.0".to_string(),
            gpio_chip: "/dev/gpiochip0".to_string(),
            rst_line: 25,
            dc_line: 24,
            max_speed_hz: 5_000_000,
            width: 128,
            height: 128,
        }
    }
}
