//! Speaker photo that slides in from a bottom corner, rests, and slides back out.

use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg::{MediaEngine, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSide {
    Left,
    Right,
}

impl FromStr for PhotoSide {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(PhotoSide::Left),
            "right" => Ok(PhotoSide::Right),
            other => Err(PipelineError::invalid(format!(
                "direction must be 'left' or 'right', got '{other}'"
            ))),
        }
    }
}

/// Scales the photo to half the frame height times `scale`, then narrows it to
/// half the frame width times `scale` if it is still too wide. Aspect ratio is kept.
pub fn fit_overlay(
    frame_w: u32,
    frame_h: u32,
    image_w: u32,
    image_h: u32,
    scale: f64,
) -> PipelineResult<(u32, u32)> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(PipelineError::invalid(format!(
            "overlay scale must be positive, got {scale}"
        )));
    }
    if image_w == 0 || image_h == 0 {
        return Err(PipelineError::invalid("overlay image has zero size"));
    }
    let max_w = (f64::from(frame_w) / 2.0 * scale).floor();
    let max_h = (f64::from(frame_h) / 2.0 * scale).floor();
    let aspect = f64::from(image_w) / f64::from(image_h);

    let mut h = max_h;
    let mut w = (h * aspect).round();
    if w > max_w {
        w = max_w;
        h = (w / aspect).round();
    }
    Ok((w.max(1.0) as u32, h.max(1.0) as u32))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideAnimation {
    pub side: PhotoSide,
    pub frame_w: f64,
    pub frame_h: f64,
    pub overlay_w: f64,
    pub overlay_h: f64,
    /// Length of each slide, in seconds.
    pub duration: f64,
    pub video_length: f64,
}

impl SlideAnimation {
    fn rest_x(&self) -> f64 {
        match self.side {
            PhotoSide::Left => 0.0,
            PhotoSide::Right => self.frame_w - self.overlay_w,
        }
    }

    fn offscreen_x(&self) -> f64 {
        match self.side {
            PhotoSide::Left => -self.overlay_w,
            PhotoSide::Right => self.frame_w,
        }
    }

    pub fn rest_y(&self) -> f64 {
        self.frame_h - self.overlay_h
    }

    /// Top-left corner of the photo at time `t`.
    pub fn position(&self, t: f64) -> (f64, f64) {
        let rest = self.rest_x();
        let off = self.offscreen_x();
        let d = self.duration;
        let x = if t < d {
            off + (rest - off) * (t / d)
        } else if t > self.video_length - d {
            let t_slide = t - (self.video_length - d);
            rest + (off - rest) * (t_slide / d)
        } else {
            rest
        };
        (x, self.rest_y())
    }

    /// The same curve as [`position`](Self::position), as an ffmpeg `overlay` x expression.
    pub fn x_expression(&self) -> String {
        let rest = self.rest_x();
        let off = self.offscreen_x();
        let d = self.duration;
        let exit_at = self.video_length - d;
        format!(
            "if(lt(t,{d}),({off})+({slide_in})*t/{d},if(gt(t,{exit_at}),({rest})+({slide_out})*(t-({exit_at}))/{d},{rest}))",
            slide_in = rest - off,
            slide_out = off - rest,
        )
    }
}

pub fn overlay_filter(animation: &SlideAnimation) -> String {
    format!(
        "[1:v]scale={w}:{h}[ov];[0:v][ov]overlay=x='{x}':y={y}:shortest=1[v]",
        w = animation.overlay_w,
        h = animation.overlay_h,
        x = animation.x_expression(),
        y = animation.rest_y(),
    )
}

pub fn overlay_args(
    video: &Path,
    image: &Path,
    animation: &SlideAnimation,
    output: &Path,
) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
        "-loop".into(),
        "1".into(),
        "-i".into(),
        image.to_string_lossy().into_owned(),
        "-filter_complex".into(),
        overlay_filter(animation),
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "0:a?".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Composites `image` over `video` with a slide-in/slide-out animation.
pub async fn add_photo_overlay<M: MediaEngine + ?Sized>(
    engine: &M,
    video: &Path,
    image: &Path,
    direction: &str,
    duration: f64,
    scale: f64,
    output: &Path,
) -> PipelineResult<()> {
    let side: PhotoSide = direction.parse()?;
    if !(duration.is_finite() && duration > 0.0) {
        return Err(PipelineError::invalid(format!(
            "slide duration must be positive, got {duration}"
        )));
    }
    if !image.is_file() {
        return Err(PipelineError::missing(image));
    }

    let host = engine.probe_video(video).await?;
    let (image_w, image_h) = image::image_dimensions(image)
        .map_err(|e| PipelineError::invalid(format!("unreadable photo {}: {e}", image.display())))?;
    let (overlay_w, overlay_h) = fit_overlay(host.width, host.height, image_w, image_h, scale)?;
    debug!(
        "Photo {}x{} fitted to {}x{} on {}x{} frame",
        image_w, image_h, overlay_w, overlay_h, host.width, host.height
    );

    let animation = SlideAnimation {
        side,
        frame_w: f64::from(host.width),
        frame_h: f64::from(host.height),
        overlay_w: f64::from(overlay_w),
        overlay_h: f64::from(overlay_h),
        duration,
        video_length: host.duration,
    };
    info!("Adding {:?} photo overlay -> {}", side, output.display());
    engine
        .run(Stage::Overlay, &overlay_args(video, image, &animation, output))
        .await
}
