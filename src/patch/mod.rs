//! Text-to-patch plumbing.
//!
//! A [`PatchSource`] turns a sound description into patch JSON (a flat
//! object of parameter id to number). The [`PatchWorker`] runs sources on a
//! background thread, writes results into the shared [`ParamStore`] through
//! the same path as manual edits, and reports [`PatchStatus`] events over a
//! channel so the caller never blocks.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchError;
use crate::params::{PARAM_SPECS, ParamKind, ParamStore, PatchReport};

#[cfg(feature = "gemini")]
pub mod gemini;

/// Parameter id to real value, as produced by a patch generator.
pub type Patch = BTreeMap<String, f64>;

/// Anything that can produce patch JSON for a prompt.
pub trait PatchSource: Send + 'static {
    fn generate(&self, prompt: &str) -> Result<String, PatchError>;
}

impl<F> PatchSource for F
where
    F: Fn(&str) -> Result<String, PatchError> + Send + 'static,
{
    fn generate(&self, prompt: &str) -> Result<String, PatchError> {
        self(prompt)
    }
}

/// Completion event of one patch request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PatchStatus {
    Applied(PatchReport),
    Failed { message: String },
}

impl PatchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PatchStatus::Applied(_))
    }

    pub fn message(&self) -> String {
        match self {
            PatchStatus::Applied(_) => "Patch generated!".to_string(),
            PatchStatus::Failed { message } => message.clone(),
        }
    }
}

/// Remove markdown code fences (```` ```json ```` / ```` ``` ````) and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = text.to_string();
    for fence in ["```json", "```JSON", "```Json", "```"] {
        out = out.replace(fence, "");
    }
    out.trim().to_string()
}

/// Decode patch JSON. Numbers, booleans and numeric strings are accepted;
/// entries with any other value kind are dropped.
pub fn parse_patch(text: &str) -> Result<Patch, PatchError> {
    let value: Value = serde_json::from_str(&strip_code_fences(text))?;
    let Value::Object(map) = value else {
        return Err(PatchError::NotAnObject);
    };

    let mut patch = Patch::new();
    for (key, value) in map {
        let number = match &value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(n) if n.is_finite() => {
                patch.insert(key, n);
            }
            _ => log::debug!("dropping non-numeric patch entry {key}: {value}"),
        }
    }
    Ok(patch)
}

/// Decode and apply patch JSON to the store in one step.
pub fn apply_patch_json(params: &ParamStore, text: &str) -> Result<PatchReport, PatchError> {
    let patch = parse_patch(text)?;
    Ok(params.apply_patch(patch))
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Pull the generated text out of a `generateContent` response body
/// (`candidates[0].content.parts[0].text`), fences stripped. A well-formed
/// body without that path yields an empty patch, `"{}"`.
pub fn extract_response_text(body: &str) -> Result<String, PatchError> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .map(|p| strip_code_fences(&p.text));
    Ok(text.unwrap_or_else(|| "{}".to_string()))
}

/// Instructions describing every parameter so a text model emits valid ids
/// and ranges.
pub fn system_prompt() -> String {
    let mut prompt = String::from(
        "You are a synthesizer patch programmer for a Dual Oscillator Subtractive Synth.\n\n\
         Available Parameters and their ranges:\n",
    );
    for spec in PARAM_SPECS {
        let kind = match spec.kind {
            ParamKind::Float => "Float",
            ParamKind::Int => "Int",
            ParamKind::Choice => "Choice",
        };
        let _ = write!(prompt, "- \"{}\" ({kind}): ", spec.id);
        if spec.choices.is_empty() {
            let _ = write!(prompt, "{} to {}", spec.min, spec.max);
            if !spec.unit.is_empty() {
                let _ = write!(prompt, " ({})", spec.unit);
            }
        } else {
            let options: Vec<String> = spec
                .choices
                .iter()
                .enumerate()
                .map(|(i, name)| format!("{i}={name}"))
                .collect();
            prompt.push_str(&options.join(", "));
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\nINSTRUCTIONS:\n\
         1. Analyze the user's description of a sound (e.g., \"warm pad\", \"laser zap\").\n\
         2. Generate a JSON object where keys are the parameter names listed above and values are the settings to achieve that sound.\n\
         3. ONLY return the JSON. No markdown formatting, no explanations.\n",
    );
    prompt
}

/// Background runner for patch requests.
pub struct PatchWorker {
    jobs: Option<Sender<String>>,
    handle: Option<JoinHandle<()>>,
}

impl PatchWorker {
    /// Start the worker thread. Status events arrive on the returned receiver.
    pub fn spawn<S: PatchSource>(
        source: S,
        params: Arc<ParamStore>,
    ) -> Result<(Self, Receiver<PatchStatus>), PatchError> {
        let (job_tx, job_rx) = unbounded::<String>();
        let (status_tx, status_rx) = unbounded();

        let handle = std::thread::Builder::new()
            .name("patch-worker".into())
            .spawn(move || run_jobs(source, &params, job_rx, status_tx))?;

        Ok((
            PatchWorker {
                jobs: Some(job_tx),
                handle: Some(handle),
            },
            status_rx,
        ))
    }

    /// Queue a prompt. Returns immediately; empty prompts are rejected here.
    pub fn request(&self, prompt: &str) -> Result<(), PatchError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PatchError::EmptyPrompt);
        }
        let jobs = self.jobs.as_ref().ok_or(PatchError::WorkerGone)?;
        jobs.send(prompt.to_string()).map_err(|_| PatchError::WorkerGone)
    }
}

impl Drop for PatchWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("patch worker panicked");
            }
        }
    }
}

fn run_jobs<S: PatchSource>(
    source: S,
    params: &ParamStore,
    jobs: Receiver<String>,
    status: Sender<PatchStatus>,
) {
    log::info!("patch worker started");
    for prompt in jobs.iter() {
        let result = source
            .generate(&prompt)
            .and_then(|text| apply_patch_json(params, &text));
        let event = match result {
            Ok(report) => {
                log::info!(
                    "applied patch: {} parameters, {} ignored",
                    report.applied,
                    report.ignored.len()
                );
                PatchStatus::Applied(report)
            }
            Err(err) => {
                log::warn!("patch request failed: {err}");
                PatchStatus::Failed { message: err.to_string() }
            }
        };
        if status.send(event).is_err() {
            break;
        }
    }
    log::info!("patch worker stopped");
}
