use colored::Colorize;

/// Stdout notifications that respect `--quiet`
#[derive(Debug, Clone, Copy)]
pub struct Notify {
    quiet: bool,
}

impl Notify {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn info(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }

    pub fn done(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{} {}", "✓".green().bold(), message.as_ref());
        }
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message.as_ref());
        }
    }
}
