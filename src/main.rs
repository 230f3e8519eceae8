use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;
use tracing::{info, warn, Level};
use tracing_subscriber::util::SubscriberInitExt;

use rgb16pc::config::{DriverConfig, PanelConfig};
use rgb16pc::render_core::{BufferMask, Rect, RenderingCore};
use rgb16pc::soft::SoftwareCore;
use rgb16pc::ssd1351::Ssd1351;
use rgb16pc::{Bitmap, DeviceDriver, Drawable, DriverContext, DriverError, Geometry, SpanDriver};

const FPS: u32 = 25;
const HEADLESS_FRAMES: u64 = 100;
const STARS: usize = 64;
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.2, 1.0];

const BARS: [[u8; 3]; 7] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
];

#[derive(Parser)]
#[command(name = "rgb16pc-demo")]
#[command(version, about = "Draws test frames through the RGB16PC driver", long_about = None)]
struct Options {
    /// Render into an in-memory bitmap instead of the SSD1351 panel
    #[arg(long)]
    headless: bool,

    /// Stop after this many frames (default: 100 headless, endless on the panel)
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Target frame rate
    #[arg(long, default_value_t = FPS, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,

    /// spidev device the panel is wired to
    #[arg(long)]
    spi: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Options {
    fn frame_limit(&self) -> Option<u64> {
        match self.frames {
            None if self.headless => Some(HEADLESS_FRAMES),
            frames => frames,
        }
    }

    fn panel(&self) -> PanelConfig {
        let mut panel = PanelConfig::default();
        if let Some(spi) = &self.spi {
            panel.spidev = spi.clone();
        }
        panel
    }
}

fn setup_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .compact()
        .finish()
        .init();
}

/// Scrolling colour bars on the top half, random stars below.
fn render_frame<C, D, R>(ctx: &mut DriverContext<C, D>, frame: u64, rng: &mut R)
where
    C: RenderingCore,
    D: Drawable,
    R: Rng,
{
    let Geometry { width, height, .. } = ctx.geometry();
    ctx.clear(BufferMask::FRONT_LEFT | BufferMask::DEPTH, true, Rect { x: 0, y: 0, width, height });

    let mut row = vec![[0u8; 3]; width as usize];
    for y in height / 2..height {
        for (x, px) in row.iter_mut().enumerate() {
            let pos = (x as u64 + frame) % width as u64;
            *px = BARS[(pos * BARS.len() as u64 / width as u64) as usize];
        }
        ctx.write_rgb_span(0, y, &row, None);
    }

    let xs: Vec<u32> = (0..STARS).map(|_| rng.gen_range(0, width)).collect();
    let ys: Vec<u32> = (0..STARS).map(|_| rng.gen_range(0, height / 2 + 1)).collect();
    let mask: Vec<bool> = (0..STARS).map(|_| rng.gen_bool(0.75)).collect();
    ctx.write_mono_rgba_pixels(&xs, &ys, [255, 255, 255, 255], &mask);
}

fn run<D, F>(drawable: D, options: &Options, mut after_swap: F) -> Result<(), DriverError>
where
    D: Drawable,
    F: FnMut(&mut D),
{
    let core = Rc::new(RefCell::new(SoftwareCore::new()));
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(drawable), DriverConfig::default())?;
    ctx.make_current();
    ctx.clear_color(CLEAR_COLOR);

    let mut rng = rand::thread_rng();
    let frame_period = Duration::from_secs_f32(1.0 / options.fps as f32);
    let limit = options.frame_limit();
    let mut frame = 0;
    while limit.map_or(true, |n| frame < n) {
        let start = Instant::now();
        render_frame(&mut ctx, frame, &mut rng);
        ctx.swap_buffers();
        after_swap(ctx.drawable_mut());
        frame += 1;

        let elapsed = start.elapsed();
        if frame_period > elapsed {
            thread::sleep(frame_period - elapsed);
        }
    }

    ctx.destroy();
    info!("rendered {} frames, presented {}", frame, core.borrow().swap_count());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    setup_logging(options.verbose);

    let panel_config = options.panel();
    if options.headless {
        let bitmap = Bitmap::new(panel_config.width, panel_config.height);
        run(bitmap, &options, |_| {})?;
    } else {
        let panel = Ssd1351::open(&panel_config)?;
        run(panel, &options, |panel| {
            if panel.is_faulted() {
                if let Err(err) = panel.recover() {
                    warn!("panel recovery failed: {}", err);
                }
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, clap::Error> {
        Options::try_parse_from(std::iter::once("rgb16pc-demo").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let options = parse(&[]).unwrap();
        assert!(!options.headless && !options.verbose);
        assert_eq!(options.fps, FPS);
        assert_eq!(options.frame_limit(), None);
        assert_eq!(options.panel(), PanelConfig::default());

        let headless = parse(&["--headless"]).unwrap();
        assert_eq!(headless.frame_limit(), Some(HEADLESS_FRAMES));
    }

    #[test]
    fn test_flags() {
        let options = parse(&["--headless", "-n", "3", "--fps", "60", "--spi", "/dev/spidev1.0", "-v"]).unwrap();
        assert_eq!(options.frame_limit(), Some(3));
        assert_eq!(options.fps, 60);
        assert_eq!(options.panel().spidev, "/dev/spidev1.0");
        assert!(options.verbose);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(parse(&["--frames", "ten"]).is_err());
        assert!(parse(&["--fps"]).is_err());
        assert!(parse(&["--fps", "0"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }
}
