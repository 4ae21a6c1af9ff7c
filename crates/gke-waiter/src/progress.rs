use std::borrow::Cow;
use std::time::Duration;

use indicatif::style::TemplateError;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

/// Renders wait progress either as a terminal spinner or as log lines
#[derive(Debug, Default)]
pub enum ProgressRenderer {
    #[default]
    Plain,
    Spinner(ProgressBar),
}

impl ProgressRenderer {
    pub fn set_message(&self, msg: impl Into<Cow<'static, str>>) {
        match self {
            Self::Plain => debug!("{}", msg.into()),
            Self::Spinner(pb) => pb.set_message(msg),
        }
    }

    pub fn finish_and_clear(&self) {
        if let Self::Spinner(pb) = self {
            pb.finish_and_clear();
        }
    }
}

impl From<ProgressBar> for ProgressRenderer {
    fn from(pb: ProgressBar) -> Self {
        Self::Spinner(pb)
    }
}

fn create_spinning_indicator() -> Result<ProgressBar, TemplateError> {
    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {spinner}")?
            .tick_chars("/-\\|"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressBarFactory {
    hide: bool,
}

impl ProgressBarFactory {
    pub fn new(hide: bool) -> Self {
        Self { hide }
    }

    /// create new progress bar
    pub fn create(&self) -> Result<ProgressRenderer, TemplateError> {
        if self.hide || std::env::var("CI").is_ok() {
            Ok(Default::default())
        } else {
            Ok(create_spinning_indicator()?.into())
        }
    }
}
