//! Terminal output: a spinner while workers run and colored status lines.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use transform_status::worker::CompletionObserver;
use transform_status::{MetadataRecord, MetadataTransformation, State, TransformationRecord};

/// Spinner shown while a transformation's sub-tasks complete.
pub struct TransformProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl TransformProgress {
    pub fn start(transform_id: &str, pending: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{transform_id}: {pending} metadata type(s) in progress"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Stop the spinner and print the overall outcome.
    pub fn finish(&self, record: &TransformationRecord) {
        self.pb.finish_and_clear();
        let state = overall_state(record);
        let style = self.style_for(state);
        println!(
            "  {} Transformation {} {state}",
            style.apply_to(marker(state)),
            record.transform_id
        );
    }

    /// Print the record as pretty JSON under a colored heading.
    pub fn print_record(&self, json: &str) {
        println!();
        println!("{}", self.yellow.apply_to("─── Transformation Record ───"));
        println!("{json}");
    }

    fn style_for(&self, state: State) -> &Style {
        match state {
            State::Successful => &self.green,
            State::Failed => &self.red,
            State::InProgress => &self.yellow,
        }
    }
}

impl CompletionObserver for TransformProgress {
    fn on_complete(&self, metadata: &MetadataTransformation) {
        let state = metadata.state();
        self.pb.println(format!(
            "  {} {}",
            self.style_for(state).apply_to(marker(state)),
            describe_metadata(&metadata.to_record())
        ));
    }
}

fn marker(state: State) -> &'static str {
    match state {
        State::Successful => "✓",
        State::Failed => "✗",
        State::InProgress => "…",
    }
}

/// State a stored record would report, folded from its sub-tasks.
pub fn overall_state(record: &TransformationRecord) -> State {
    if record.metadata.is_empty()
        || record
            .metadata
            .iter()
            .any(|m| m.state == State::InProgress)
    {
        State::InProgress
    } else if record.metadata.iter().any(|m| m.state == State::Failed) {
        State::Failed
    } else {
        State::Successful
    }
}

/// One-line description of a sub-task.
pub fn describe_metadata(metadata: &MetadataRecord) -> String {
    match metadata.state {
        State::InProgress => format!("{}: {}", metadata.metadata_type, metadata.state),
        State::Successful => format!(
            "{}: {} ({}, {} bytes)",
            metadata.metadata_type,
            metadata.state,
            metadata.content_type.as_deref().unwrap_or("unknown type"),
            metadata.content.as_ref().map_or(0, Vec::len)
        ),
        State::Failed => format!(
            "{}: {} ({}: {})",
            metadata.metadata_type,
            metadata.state,
            metadata
                .failure_reason
                .map_or_else(|| "UNKNOWN".to_string(), |r| r.to_string()),
            metadata.failure_message.as_deref().unwrap_or("")
        ),
    }
}

/// Summary lines for the `inspect` command.
pub fn summary_lines(record: &TransformationRecord) -> Vec<String> {
    let mut lines = vec![
        format!("transformation {} {}", record.transform_id, overall_state(record)),
        format!("  source:   {}", record.request_info.current_location()),
        format!("  final:    {}", record.request_info.final_location()),
        format!("  metadata: {}", record.request_info.metadata_location()),
        format!("  started:  {}", record.start_time.to_rfc3339()),
    ];
    lines.extend(
        record
            .metadata
            .iter()
            .map(|m| format!("  - {}", describe_metadata(m))),
    );
    lines
}
