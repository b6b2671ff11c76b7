//! Output formatting for the CLI
//!
//! Human-readable renderings of daemon state and progress, plus colored
//! status lines.

use tabled::{settings::Style, Table, Tabled};

use eco_protocol::{FeedEvent, MetaState, Progress, ServiceId};

/// Format the daemon state as a summary followed by a service table
pub fn format_state(state: &MetaState) -> String {
    #[derive(Tabled)]
    struct ServiceRow {
        #[tabled(rename = "SERVICE")]
        service: &'static str,
        #[tabled(rename = "STATUS")]
        status: &'static str,
    }

    let mut output = String::new();
    let version = if state.eco.version.is_empty() {
        "not installed"
    } else {
        state.eco.version.as_str()
    };
    output.push_str(&format!("Sync mode: {}\n", state.eco.sync_mode));
    output.push_str(&format!("Version: {}\n", version));
    output.push_str(&format!(
        "Wallet: {}\n\n",
        if state.eco.wallet_exists {
            "created"
        } else {
            "none"
        }
    ));

    let rows: Vec<ServiceRow> = ServiceId::ALL
        .iter()
        .map(|svc| ServiceRow {
            service: svc.as_str(),
            status: match state.services.get(svc) {
                Some(status) if status.on => "running",
                _ => "stopped",
            },
        })
        .collect();
    output.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    output
}

/// One line for a progress report
pub fn format_progress(progress: &Progress) -> String {
    if !progress.err.is_empty() {
        return format!("[{}] {}: {}", progress.service, progress.status, progress.err);
    }
    format!(
        "[{}] {:>5.1}% {}",
        progress.service,
        progress.progress * 100.0,
        progress.status
    )
}

/// One line for a feed event
pub fn format_event(event: &FeedEvent) -> String {
    match event {
        FeedEvent::Sync(progress) => format_progress(progress),
        FeedEvent::Status(status) => format!(
            "[{}] {}",
            status.service,
            if status.on { "started" } else { "stopped" }
        ),
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Goes to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
