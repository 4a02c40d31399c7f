use std::env;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use relpack_builder::PipelineStage;

const STAGE_TEMPLATE: &str = "{spinner:.cyan.bold} {prefix:.bold} {msg:<10} [{bar:16.cyan/blue}] {pos}/{len}";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Tone {
    Ok,
    Warn,
    Err,
    Step,
    Heading,
    Meter,
}

impl Tone {
    fn from_status(status: &str) -> Self {
        match status {
            "ok" => Self::Ok,
            "warn" => Self::Warn,
            "err" => Self::Err,
            _ => Self::Step,
        }
    }

    fn badge(self) -> &'static str {
        match self {
            Self::Ok => "[OK]",
            Self::Warn => "[WARN]",
            Self::Err => "[ERR]",
            _ => "[..]",
        }
    }

    fn style(self) -> Style {
        let (color, bold) = match self {
            Self::Ok => (AnsiColor::BrightGreen, true),
            Self::Warn => (AnsiColor::BrightYellow, true),
            Self::Err => (AnsiColor::BrightRed, true),
            Self::Step => (AnsiColor::BrightBlack, false),
            Self::Heading => (AnsiColor::BrightBlue, true),
            Self::Meter => (AnsiColor::BrightCyan, false),
        };
        let style = Style::new().fg_color(Some(color.into()));
        if bold {
            style.effects(Effects::BOLD)
        } else {
            style
        }
    }

    fn paint(self, text: &str) -> String {
        let style = self.style();
        format!("{}{text}{}", style.render(), style.render_reset())
    }
}

/// Writes status lines to the terminal in the selected [`OutputStyle`].
#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

/// Spinner over the pipeline stages; silent in plain mode.
pub(crate) struct StageProgress {
    label: String,
    reached: usize,
    bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", self.decorate(status, message));
    }

    pub(crate) fn print_error(self, message: &str) {
        match self.style {
            OutputStyle::Plain => eprintln!("error: {message}"),
            OutputStyle::Rich => eprintln!("{}", self.decorate("err", message)),
        }
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!("{}", Tone::Heading.paint(&format!(":: {title}")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_progress(self, label: &str) -> StageProgress {
        let bar = (self.style == OutputStyle::Rich).then(|| {
            let bar = ProgressBar::new(PipelineStage::ALL.len() as u64);
            if let Ok(style) = ProgressStyle::with_template(STAGE_TEMPLATE) {
                bar.set_style(style.tick_chars("|/-\\ ").progress_chars("#>-"));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });

        StageProgress {
            label: label.to_string(),
            reached: 0,
            bar,
            started_at: Instant::now(),
        }
    }

    fn decorate(self, status: &str, message: &str) -> String {
        match self.style {
            OutputStyle::Plain => render_status_line(self.style, status, message),
            OutputStyle::Rich => {
                let tone = Tone::from_status(status);
                format!("{} {message}", tone.paint(tone.badge()))
            }
        }
    }
}

impl StageProgress {
    pub(crate) fn enter(&mut self, stage: PipelineStage) {
        self.reached = stage.position() + 1;
        if let Some(bar) = &self.bar {
            bar.set_message(stage.as_str());
            bar.set_position(self.reached as u64);
        }
    }

    pub(crate) fn finish_success(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            println!(
                "{}",
                render_stage_summary(&self.label, self.reached, self.started_at.elapsed())
            );
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon_with_message(format!("stopped after {} stages", self.reached));
        }
    }
}

pub(crate) fn current_output_style(force_plain: bool) -> OutputStyle {
    let no_color = env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    resolve_output_style(force_plain, no_color, std::io::stdout().is_terminal())
}

pub(crate) fn resolve_output_style(
    force_plain: bool,
    no_color: bool,
    stdout_is_tty: bool,
) -> OutputStyle {
    if force_plain || no_color || !stdout_is_tty {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

/// Uncolored form of what [`TerminalRenderer::print_status`] writes.
pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", Tone::from_status(status).badge()),
    }
}

/// `build: 8/8 stages (validate .. cleanup) in 2 seconds`
pub(crate) fn render_stage_summary(label: &str, reached: usize, elapsed: Duration) -> String {
    let total = PipelineStage::ALL.len();
    let last = PipelineStage::ALL
        .get(reached.saturating_sub(1))
        .copied()
        .unwrap_or(PipelineStage::Validate);
    Tone::Meter.paint(&format!(
        "{label}: {}/{total} stages ({} .. {last}) in {}",
        reached.min(total),
        PipelineStage::Validate,
        HumanDuration(elapsed)
    ))
}
