use livemask::config::{self, MaskParams, SessionSettings, USEGPU_CPU};
use livemask::output::composite_background;
use livemask::session::{BackendOptions, TensorSpec, TensorView};
use livemask::{
    AssetResolver, BackgroundFilter, BgraFrame, FrameExchange, InferenceRuntime, RuntimeError,
    RuntimeLoader, TickOutcome, VideoFilter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Selfie-shaped network whose output is a function of the pixel column.
struct ColumnNet {
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    size: usize,
    foreground: fn(usize, usize) -> f32,
}

impl InferenceRuntime for ColumnNet {
    fn inputs(&self) -> &[TensorSpec] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorSpec] {
        &self.outputs
    }

    fn run(
        &mut self,
        inputs: &[TensorView<'_>],
        _output_names: &[String],
        outputs: &mut [Vec<f32>],
    ) -> Result<(), RuntimeError> {
        assert_eq!(inputs[0].data.len(), self.size * self.size * 3);
        for (i, value) in outputs[0].iter_mut().enumerate() {
            *value = (self.foreground)(i % self.size, self.size);
        }
        Ok(())
    }
}

struct ColumnLoader {
    foreground: fn(usize, usize) -> f32,
}

impl RuntimeLoader for ColumnLoader {
    fn load(
        &self,
        _model_path: &Path,
        _options: &BackendOptions,
    ) -> Result<Box<dyn InferenceRuntime>, RuntimeError> {
        let n = 16;
        Ok(Box::new(ColumnNet {
            inputs: vec![TensorSpec::new("input_1", vec![1, n, n, 3])],
            outputs: vec![TensorSpec::new("segment", vec![1, n, n, 1])],
            size: n as usize,
            foreground: self.foreground,
        }))
    }
}

struct Models;

impl AssetResolver for Models {
    fn resolve(&self, logical_name: &str) -> Option<PathBuf> {
        Some(PathBuf::from("/opt/livemask").join(logical_name))
    }
}

fn filter(foreground: fn(usize, usize) -> f32) -> BackgroundFilter {
    let filter = BackgroundFilter::new(
        Arc::new(FrameExchange::new()),
        Arc::new(Models),
        Arc::new(ColumnLoader { foreground }),
    );
    let settings = SessionSettings::new(config::MODEL_SELFIE, USEGPU_CPU, 1);
    filter.set_params(&MaskParams {
        enable_threshold: true,
        threshold: 0.5,
        contour_filter: 0.0,
        smooth_contour: 0.0,
        feather: 0.0,
        temporal_smooth_factor: 0.0,
        enable_image_similarity: false,
        ..MaskParams::default()
    });
    filter.initialize(&settings).unwrap();
    filter
}

#[test]
fn white_frame_through_a_flat_network_gives_a_uniform_mask() {
    let filter = filter(|_, _| 0.7);
    filter
        .core()
        .exchange()
        .publish_input(BgraFrame::filled(100, 100, [255, 255, 255, 255]));

    assert_eq!(filter.on_tick(), TickOutcome::Computed);
    let mask = filter.get_current_mask().unwrap();
    assert_eq!(mask.dimensions(), (100, 100));
    // min-max normalize of a constant field is all zero: everything is background
    assert!(mask.pixels().all(|p| p[0] == 255));
}

#[test]
fn left_half_person_keeps_left_half_of_the_frame() {
    let filter = filter(|x, n| if x < n / 2 { 1.0 } else { 0.0 });
    let frame = BgraFrame::filled(32, 16, [40, 80, 120, 255]);
    filter.core().exchange().publish_input(frame.clone());

    assert_eq!(filter.on_tick(), TickOutcome::Computed);
    let mask = filter.get_current_mask().unwrap();
    assert_eq!(mask.get_pixel(2, 8)[0], 0);
    assert_eq!(mask.get_pixel(29, 8)[0], 255);

    let out = composite_background(&frame, &mask, [0, 255, 0]);
    assert_eq!(out.get_pixel(2, 8).0, [120, 80, 40]);
    assert_eq!(out.get_pixel(29, 8).0, [0, 255, 0]);
}

#[test]
fn render_and_tick_contexts_run_concurrently() {
    let filter = Arc::new(filter(|x, n| if x < n / 2 { 1.0 } else { 0.0 }));
    let exchange = filter.core().exchange().clone();

    let render = thread::spawn(move || {
        for i in 0..200u32 {
            let shade = (i % 256) as u8;
            exchange.publish_input(BgraFrame::filled(24, 12, [shade, shade, shade, 255]));
        }
    });

    let ticker = filter.clone();
    let tick = thread::spawn(move || {
        let mut computed = 0;
        for _ in 0..200 {
            match ticker.on_tick() {
                TickOutcome::Computed => computed += 1,
                TickOutcome::Contended | TickOutcome::NoInput => {}
                other => panic!("unexpected tick outcome {other:?}"),
            }
        }
        computed
    });

    render.join().unwrap();
    let computed = tick.join().unwrap();
    if computed == 0 {
        assert_eq!(filter.on_tick(), TickOutcome::Computed);
    }
    assert_eq!(filter.get_current_mask().unwrap().dimensions(), (24, 12));
}
