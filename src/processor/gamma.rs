//! Linear-light wrapper.
//!
//! Resampling averages channel values, which is only correct for linear
//! intensities. [`GammaProcessor`] converts the image to linear light
//! (`γ = 1/2.2`), runs the inner processor, and converts back (`γ = 2.2`).
//! Both curves are 65536-entry lookup tables built on first use.
//!
//! The `gamma_correction` bool parameter overrides the default given at
//! construction.

use super::Processor;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::params::Params;
use crate::pixel::{Color, Layout, PixelBuffer, map_pixels, new_at_func, run_mut};
use std::sync::{Arc, OnceLock};

const DARKEN: f64 = 1.0 / 2.2;
const LIGHTEN: f64 = 2.2;

/// `lut[i] = round((i / 65535) ^ (1 / gamma) * 65535)`
fn build_lut(gamma: f64) -> Vec<u16> {
    (0..=u16::MAX)
        .map(|i| ((f64::from(i) / 65535.0).powf(1.0 / gamma) * 65535.0).round() as u16)
        .collect()
}

fn darken_lut() -> &'static [u16] {
    static LUT: OnceLock<Vec<u16>> = OnceLock::new();
    LUT.get_or_init(|| build_lut(DARKEN))
}

fn lighten_lut() -> &'static [u16] {
    static LUT: OnceLock<Vec<u16>> = OnceLock::new();
    LUT.get_or_init(|| build_lut(LIGHTEN))
}

#[inline]
fn apply(lut: &[u16], c: Color) -> Color {
    let map = |v: u32| u32::from(lut[v.min(0xffff) as usize]);
    Color::new(map(c.r), map(c.g), map(c.b), c.a)
}

pub struct GammaProcessor {
    inner: Arc<dyn Processor>,
    enabled: bool,
}

impl GammaProcessor {
    pub fn new(inner: Arc<dyn Processor>, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    fn enabled(&self, params: &Params) -> Result<bool> {
        if params.has("gamma_correction") {
            Ok(params.get_bool("gamma_correction")?)
        } else {
            Ok(self.enabled)
        }
    }
}

impl Processor for GammaProcessor {
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        if !self.enabled(params)? || !self.inner.change(params) {
            return self.inner.process(buf, params, cancel);
        }

        // 16 bits per channel so the curves do not band.
        let linear = match buf {
            PixelBuffer::Uniform(c) => PixelBuffer::Uniform(apply(darken_lut(), c)),
            src => {
                let lut = darken_lut();
                let mut dst = PixelBuffer::new(Layout::Nrgba64, src.bounds());
                let at = new_at_func(&src);
                run_mut(&mut dst, cancel, |band, set| {
                    for y in band.y0..band.y1 {
                        for x in band.x0..band.x1 {
                            set(x, y, apply(lut, at(x, y)));
                        }
                    }
                    Ok(())
                })?;
                dst
            }
        };

        let mut out = self.inner.process(linear, params, cancel)?;
        let lut = lighten_lut();
        map_pixels(&mut out, cancel, |c| apply(lut, c))?;
        Ok(out)
    }

    fn change(&self, params: &Params) -> bool {
        self.inner.change(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorFunc;
    use crate::processor::tests::RecordingProcessor;
    use crate::pixel::{Rect, new_set_func};
    use std::sync::Mutex;

    fn identity() -> impl Processor {
        ProcessorFunc::new(
            |b: PixelBuffer, _: &Params, _: &CancelToken| -> Result<PixelBuffer> { Ok(b) },
        )
    }

    #[test]
    fn luts_have_fixed_endpoints_and_invert() {
        let (d, l) = (darken_lut(), lighten_lut());
        assert_eq!(d.len(), 65536);
        assert_eq!((d[0], d[65535]), (0, 65535));
        assert_eq!((l[0], l[65535]), (0, 65535));
        // Mid grey darkens in linear light.
        assert!(d[0x8000] < 0x8000);
        assert!(l[0x8000] > 0x8000);
        for v in [0x1000u16, 0x4000, 0x8000, 0xc000] {
            let back = l[d[v as usize] as usize];
            assert!(back.abs_diff(v) <= 64, "{v:#x} -> {back:#x}");
        }
    }

    #[test]
    fn inner_sees_linear_values() {
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        let inner = ProcessorFunc::new(
            move |b: PixelBuffer, _: &Params, _: &CancelToken| -> Result<PixelBuffer> {
                *record.lock().unwrap() = Some(new_at_func(&b)(0, 0));
                Ok(b)
            },
        );
        let mut buf = PixelBuffer::new(Layout::Nrgba, Rect::from_size(1, 1));
        new_set_func(&mut buf)(0, 0, Color::from_rgba8(0x80, 0x80, 0x80, 0xff));
        let gamma = GammaProcessor::new(Arc::new(inner), true);
        let out = gamma.process(buf, &Params::new(), &CancelToken::new()).unwrap();

        let linear = seen.lock().unwrap().unwrap();
        assert_eq!(u32::from(darken_lut()[0x8080]), linear.r);
        // Lightened back to roughly where it started.
        assert!(new_at_func(&out)(0, 0).r.abs_diff(0x8080) <= 64);
    }

    #[test]
    fn parameter_disables_correction() {
        let inner = Arc::new(RecordingProcessor::new(Color::new(0x8000, 0x8000, 0x8000, 0xffff), true));
        let gamma = GammaProcessor::new(inner, true);
        let params = Params::new().with("gamma_correction", false);
        let out = gamma
            .process(PixelBuffer::Uniform(Color::BLACK), &params, &CancelToken::new())
            .unwrap();
        // Without the lighten pass the fill colour is untouched.
        assert_eq!(new_at_func(&out)(0, 0).r, 0x8000);

        let out = gamma
            .process(PixelBuffer::Uniform(Color::BLACK), &Params::new(), &CancelToken::new())
            .unwrap();
        assert_eq!(new_at_func(&out)(0, 0).r, u32::from(lighten_lut()[0x8000]));
    }

    #[test]
    fn skipped_when_inner_would_not_change() {
        let inner = Arc::new(RecordingProcessor::new(Color::WHITE, false));
        let gamma = GammaProcessor::new(inner.clone(), true);
        assert!(!gamma.change(&Params::new()));
        let out = gamma
            .process(PixelBuffer::Uniform(Color::BLACK), &Params::new(), &CancelToken::new())
            .unwrap();
        assert!(matches!(out, PixelBuffer::Uniform(Color::WHITE)));
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn wrong_type_parameter_is_an_error() {
        let gamma = GammaProcessor::new(Arc::new(identity()), false);
        let params = Params::new().with("gamma_correction", 1);
        assert!(gamma
            .process(PixelBuffer::Uniform(Color::BLACK), &params, &CancelToken::new())
            .is_err());
    }
}
