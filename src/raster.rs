use crate::catalog::ContentType;
use serde::Serialize;

/// Advisory text shown when both export paths fail. Never an exception.
pub const EXPORT_FAILED_ADVISORY: &str =
    "Export failed. Please take a screenshot of your board instead.";

/// Call contract handed to the frontend rasterizer: render the board subtree
/// with these options, after removing the listed interactive chrome from the
/// DOM clone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPlan {
    pub quality: f64,
    pub background_color: String,
    pub strip_selectors: Vec<String>,
}

pub fn plan_for(content_type: ContentType) -> ExportPlan {
    let background_color = match content_type {
        ContentType::Ramadan => "#1b2a4a".to_string(),
        _ => "#ffffff".to_string(),
    };
    ExportPlan {
        quality: 0.95,
        background_color,
        strip_selectors: vec![
            ".bucket-controls".to_string(),
            ".item-remove".to_string(),
            ".drag-handle".to_string(),
            ".save-bar".to_string(),
        ],
    }
}

// The render side of the contract runs in the frontend; the types and the
// fallback orchestration below are its reference semantics.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub quality: f64,
    pub background_color: String,
}

#[allow(dead_code)]
impl From<&ExportPlan> for RenderOptions {
    fn from(plan: &ExportPlan) -> Self {
        RenderOptions {
            quality: plan.quality,
            background_color: plan.background_color.clone(),
        }
    }
}

/// The external image renderer. PNG data-URL export is the primary path,
/// blob export the fallback.
#[allow(dead_code)]
pub trait Rasterizer {
    fn render_png(&mut self, opts: &RenderOptions) -> Result<Vec<u8>, String>;
    fn render_blob(&mut self, opts: &RenderOptions) -> Result<Vec<u8>, String>;
}

#[allow(dead_code)]
#[derive(Debug, PartialEq)]
pub enum ExportOutcome {
    Png(Vec<u8>),
    Blob(Vec<u8>),
    /// Both paths failed; the payload is the advisory message for the user.
    Failed(&'static str),
}

/// PNG first; one blob retry on failure; then give up with the advisory
/// message. No further retries.
#[allow(dead_code)]
pub fn export_image(rasterizer: &mut impl Rasterizer, opts: &RenderOptions) -> ExportOutcome {
    match rasterizer.render_png(opts) {
        Ok(bytes) => ExportOutcome::Png(bytes),
        Err(png_err) => {
            log::warn!("png export failed, retrying as blob: {png_err}");
            match rasterizer.render_blob(opts) {
                Ok(bytes) => ExportOutcome::Blob(bytes),
                Err(blob_err) => {
                    log::warn!("blob export failed: {blob_err}");
                    ExportOutcome::Failed(EXPORT_FAILED_ADVISORY)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyRasterizer {
        png_ok: bool,
        blob_ok: bool,
        png_calls: u32,
        blob_calls: u32,
    }

    impl FlakyRasterizer {
        fn new(png_ok: bool, blob_ok: bool) -> Self {
            FlakyRasterizer {
                png_ok,
                blob_ok,
                png_calls: 0,
                blob_calls: 0,
            }
        }
    }

    impl Rasterizer for FlakyRasterizer {
        fn render_png(&mut self, _opts: &RenderOptions) -> Result<Vec<u8>, String> {
            self.png_calls += 1;
            if self.png_ok {
                Ok(vec![1])
            } else {
                Err("canvas tainted".to_string())
            }
        }
        fn render_blob(&mut self, _opts: &RenderOptions) -> Result<Vec<u8>, String> {
            self.blob_calls += 1;
            if self.blob_ok {
                Ok(vec![2])
            } else {
                Err("blob failed".to_string())
            }
        }
    }

    fn opts() -> RenderOptions {
        RenderOptions::from(&plan_for(ContentType::Member))
    }

    #[test]
    fn png_success_skips_blob_path() {
        let mut r = FlakyRasterizer::new(true, true);
        assert_eq!(export_image(&mut r, &opts()), ExportOutcome::Png(vec![1]));
        assert_eq!(r.blob_calls, 0);
    }

    #[test]
    fn png_failure_retries_once_as_blob() {
        let mut r = FlakyRasterizer::new(false, true);
        assert_eq!(export_image(&mut r, &opts()), ExportOutcome::Blob(vec![2]));
        assert_eq!(r.png_calls, 1);
        assert_eq!(r.blob_calls, 1);
    }

    #[test]
    fn double_failure_surfaces_advisory_text_without_more_retries() {
        let mut r = FlakyRasterizer::new(false, false);
        assert_eq!(
            export_image(&mut r, &opts()),
            ExportOutcome::Failed(EXPORT_FAILED_ADVISORY)
        );
        assert_eq!(r.png_calls, 1);
        assert_eq!(r.blob_calls, 1);
    }

    #[test]
    fn export_plan_carries_chrome_strip_list() {
        let plan = plan_for(ContentType::Member);
        assert!(plan.strip_selectors.contains(&".drag-handle".to_string()));
        assert_eq!(plan.background_color, "#ffffff");
        assert_eq!(plan_for(ContentType::Ramadan).background_color, "#1b2a4a");
    }
}
