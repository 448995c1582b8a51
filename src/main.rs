use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::RgbImage;
use livemask::capture::{CaptureSource, WebcamCapture};
use livemask::config::{self, EnhanceParams, MaskParams, SessionSettings};
use livemask::output::{self, OutputSink, V4L2Output};
use livemask::session::Device;
use livemask::{
    BackgroundFilter, BgraFrame, DirAssetResolver, EnhanceFilter, FrameExchange, ModelDescriptor,
    OrtLoader, TickOutcome, VideoFilter,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Effect {
    /// Replace the background with a solid colour
    Background,
    /// Low-light enhancement
    Enhance,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target output frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Mask computations per second
    #[arg(long, default_value_t = 30)]
    tick_fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[arg(long, value_enum, default_value_t = Effect::Background)]
    effect: Effect,

    /// Model asset or short name (mediapipe, selfie, rvm, tbefn, ...).
    /// Defaults to mediapipe for background and tbefn for enhance
    #[arg(long)]
    model: Option<String>,

    /// Directory that contains the models/ folder
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Inference device: cpu, cuda, tensorrt, dml or coreml
    #[arg(long, default_value = config::USEGPU_CPU)]
    device: String,

    /// Inference threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 1)]
    threads: u32,

    /// Fail instead of retrying on CPU when the device does not start
    #[arg(long)]
    no_cpu_fallback: bool,

    /// Use the soft network output instead of a thresholded mask
    #[arg(long)]
    no_threshold: bool,

    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Drop blobs smaller than this fraction of the frame
    #[arg(long, default_value_t = 0.05)]
    contour_filter: f32,

    #[arg(long, default_value_t = 0.5)]
    smooth_contour: f32,

    #[arg(long, default_value_t = 0.0)]
    feather: f32,

    /// Recompute the mask every N ticks
    #[arg(long, default_value_t = 1)]
    mask_every: u32,

    /// Weight of the new mask against the previous one
    #[arg(long, default_value_t = 0.85)]
    temporal_smooth: f32,

    /// Recompute even when the frame did not change
    #[arg(long)]
    no_similarity: bool,

    /// PSNR in dB above which a frame counts as unchanged
    #[arg(long, default_value_t = 35.0)]
    similarity_threshold: f32,

    /// Show the mask instead of the composited video
    #[arg(long)]
    show_mask: bool,

    /// Replacement background colour as RRGGBB
    #[arg(long, default_value = "00ff00", value_parser = output::parse_hex_color)]
    background_color: [u8; 3],

    /// Enhanced frame weight over the source, 0 to 1
    #[arg(long, default_value_t = 1.0)]
    blend: f32,
}

impl Args {
    fn session_settings(&self) -> SessionSettings {
        let model = self.model.clone().unwrap_or_else(|| {
            match self.effect {
                Effect::Background => config::MODEL_MEDIAPIPE,
                Effect::Enhance => config::MODEL_ENHANCE_TBEFN,
            }
            .to_string()
        });
        SessionSettings {
            fallback_to_cpu: !self.no_cpu_fallback,
            ..SessionSettings::new(model, self.device.clone(), self.threads)
        }
    }

    fn mask_params(&self) -> MaskParams {
        MaskParams {
            enable_threshold: !self.no_threshold,
            threshold: self.threshold,
            contour_filter: self.contour_filter,
            smooth_contour: self.smooth_contour,
            feather: self.feather,
            mask_every_x_frames: self.mask_every,
            temporal_smooth_factor: self.temporal_smooth,
            enable_image_similarity: !self.no_similarity,
            image_similarity_threshold: self.similarity_threshold,
        }
    }
}

/// Turns the latest filter result plus the live frame into output video.
enum Compositor {
    Background {
        filter: Arc<BackgroundFilter>,
        color: [u8; 3],
        show_mask: bool,
    },
    Enhance {
        filter: Arc<EnhanceFilter>,
    },
}

impl Compositor {
    fn render(&self, frame: &BgraFrame) -> RgbImage {
        match self {
            Compositor::Background {
                filter,
                color,
                show_mask,
            } => match filter.get_current_mask() {
                Some(mask) if filter.is_active() => {
                    if *show_mask {
                        output::mask_view(&mask, frame.dimensions())
                    } else {
                        output::composite_background(frame, &mask, *color)
                    }
                }
                _ => frame.to_rgb(),
            },
            Compositor::Enhance { filter } => match filter.get_current_frame() {
                Some(enhanced) if filter.is_active() => {
                    output::blend_enhanced(frame, &enhanced, filter.blend())
                }
                _ => frame.to_rgb(),
            },
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("livemask starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}, mask ticks per second: {}", args.fps, args.tick_fps);

    let mut capture = WebcamCapture::new(args.input_device, args.capture_width, args.capture_height)
        .context("Failed to initialize webcam capture")?;
    let mut output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let exchange = Arc::new(FrameExchange::new());
    let resolver = Arc::new(DirAssetResolver::new(&args.data_dir));
    let loader = Arc::new(OrtLoader);
    let settings = args.session_settings();
    check_selection(&args, &settings);
    tracing::info!("Models directory: {}", resolver.root().display());

    let (ticker, compositor): (Arc<dyn VideoFilter>, Compositor) = match args.effect {
        Effect::Background => {
            let filter = Arc::new(BackgroundFilter::new(exchange.clone(), resolver, loader));
            filter.set_params(&args.mask_params());
            if let Err(e) = filter.initialize(&settings) {
                tracing::warn!("Background filter unavailable ({}), passing video through", e);
            }
            let compositor = Compositor::Background {
                filter: filter.clone(),
                color: args.background_color,
                show_mask: args.show_mask,
            };
            (filter as Arc<dyn VideoFilter>, compositor)
        }
        Effect::Enhance => {
            let filter = Arc::new(EnhanceFilter::new(exchange.clone(), resolver, loader));
            filter.set_params(&EnhanceParams { blend: args.blend });
            if let Err(e) = filter.initialize(&settings) {
                tracing::warn!("Enhance filter unavailable ({}), passing video through", e);
            }
            let compositor = Compositor::Enhance {
                filter: filter.clone(),
            };
            (filter as Arc<dyn VideoFilter>, compositor)
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let tick_thread = {
        let running = running.clone();
        let tick_fps = args.tick_fps.max(1);
        thread::Builder::new()
            .name("livemask-tick".into())
            .spawn(move || run_ticks(ticker.as_ref(), tick_fps, &running))
            .context("Failed to start tick thread")?
    };

    let result = run_pipeline(&mut capture, &mut output, &exchange, &compositor, args.fps);

    running.store(false, Ordering::Release);
    if tick_thread.join().is_err() {
        tracing::error!("Tick thread panicked");
    }
    result
}

/// Warn about selections that will load but probably not do what was meant.
fn check_selection(args: &Args, settings: &SessionSettings) {
    let available = Device::available();
    let names: Vec<&str> = available.iter().map(|d| d.name()).collect();
    tracing::info!("Devices on this platform: {}", names.join(", "));
    match settings.device.parse::<Device>() {
        Ok(device) if !available.contains(&device) => {
            tracing::warn!("Device {} is not offered on this platform", device)
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("{}", e),
    }

    if let Some(descriptor) = ModelDescriptor::from_selection(&settings.model) {
        let enhancing = args.effect == Effect::Enhance;
        if descriptor.kind.is_enhancement() != enhancing {
            tracing::warn!(
                "Model {} does not match the {:?} effect",
                descriptor.kind,
                args.effect
            );
        }
    }
}

/// Computation context: one filter tick per period until told to stop.
fn run_ticks(filter: &dyn VideoFilter, tick_fps: u32, running: &AtomicBool) {
    let period = Duration::from_secs_f32(1.0 / tick_fps as f32);
    let mut ticks = 0u64;
    let mut computed = 0u64;
    let mut total_compute_time = Duration::ZERO;

    tracing::info!("{} filter ticking every {:.1}ms", filter.name(), period.as_secs_f64() * 1000.0);
    while running.load(Ordering::Acquire) {
        let tick_start = Instant::now();
        let outcome = filter.on_tick();
        let elapsed = tick_start.elapsed();
        ticks += 1;

        match outcome {
            TickOutcome::Computed => {
                computed += 1;
                total_compute_time += elapsed;
            }
            other => tracing::debug!("Tick {}: {:?}", ticks, other),
        }

        if ticks % 30 == 0 && computed > 0 {
            tracing::debug!(
                "Tick {}: {} computed, avg compute={:.1}ms",
                ticks,
                computed,
                total_compute_time.as_secs_f64() * 1000.0 / computed as f64
            );
        }

        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }
}

/// Render context: capture, publish, composite and write, forever.
fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    exchange: &FrameExchange,
    compositor: &Compositor,
    target_fps: u32,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_composite_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = capture.capture_frame().context("Failed to capture frame")?;
        exchange.publish_input(frame.clone());
        total_capture_time += capture_start.elapsed();

        let composite_start = Instant::now();
        let output_frame = compositor.render(&frame);
        total_composite_time += composite_start.elapsed();

        let output_start = Instant::now();
        output
            .write_frame(&output_frame)
            .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_composite_ms = total_composite_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_composite_ms + avg_output_ms;
            tracing::info!(
                "Frame {}: capture={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_composite_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }
}
