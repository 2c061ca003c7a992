//! Sandboxed frame markup

use splot_core::EmbedConfig;

use crate::escape::escape_srcdoc;

/// Presentation of the frame a resolved placeholder becomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOptions {
    pub sandbox: Vec<String>,
    pub width: String,
    pub height: String,
    pub border: String,
}

impl EmbedOptions {
    /// Value of the `sandbox` attribute
    pub fn sandbox_attr(&self) -> String {
        self.sandbox.join(" ")
    }

    /// Value of the `style` attribute
    pub fn style_attr(&self) -> String {
        format!(
            "width: {}; height: {}; border: {};",
            self.width, self.height, self.border
        )
    }
}

impl From<&EmbedConfig> for EmbedOptions {
    fn from(config: &EmbedConfig) -> Self {
        Self {
            sandbox: config.sandbox.clone(),
            width: config.width.clone(),
            height: config.height.clone(),
            border: config.border.clone(),
        }
    }
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self::from(&EmbedConfig::default())
    }
}

/// Build the frame for a stored document, inlining it through `srcdoc`
pub fn render_iframe(html: &str, options: &EmbedOptions) -> String {
    format!(
        r#"<iframe srcdoc="{}" sandbox="{}" style="{}"></iframe>"#,
        escape_srcdoc(html),
        html_escape::encode_double_quoted_attribute(&options.sandbox_attr()),
        html_escape::encode_double_quoted_attribute(&options.style_attr()),
    )
}
