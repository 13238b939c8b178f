//! Operator-facing text for device output.

use std::fmt::Write;

use rokudbg_protocol::{CompileErrors, RuntimeError, StackFrame, StopInfo, ThreadInfo};

/// One line per thread, as shown by `threads`.
pub fn thread_listing(threads: &[ThreadInfo]) -> String {
    let mut out = String::new();
    for (index, thread) in threads.iter().enumerate() {
        let _ = writeln!(out, "Thread {index}: {}", thread.file_path);
    }
    out
}

/// Full detail for one thread, as shown by `thread N`.
pub fn thread_detail(index: usize, thread: &ThreadInfo) -> String {
    let mut out = format!(
        "Thread {index}\n  function: {}\n  location: {}:{}\n  stop reason: {}",
        thread.function_name, thread.file_path, thread.line_number, thread.stop_reason
    );
    if !thread.stop_reason_detail.is_empty() {
        let _ = write!(out, " ({})", thread.stop_reason_detail);
    }
    if !thread.code_snippet.is_empty() {
        let _ = write!(out, "\n  > {}", thread.code_snippet);
    }
    out
}

pub fn stack_trace(frames: &[StackFrame]) -> String {
    let mut out = String::new();
    for (depth, frame) in frames.iter().enumerate() {
        let _ = writeln!(
            out,
            "#{depth} {} at {}:{}",
            frame.function_name, frame.file_name, frame.line_number
        );
    }
    out
}

pub fn stopped(info: &StopInfo) -> String {
    let mut out = format!(
        "All threads stopped (thread {}, reason {})",
        info.primary_thread_index, info.stop_reason
    );
    if !info.stop_reason_detail.is_empty() {
        let _ = write!(out, ": {}", info.stop_reason_detail);
    }
    out
}

pub fn compile_errors(errors: &CompileErrors) -> String {
    let mut out = String::from("Compile errors:");
    for line in errors
        .compile_errors
        .iter()
        .chain(&errors.runtime_errors)
        .chain(&errors.other_errors)
    {
        let _ = write!(out, "\n  {line}");
    }
    out
}

pub fn runtime_error(error: &RuntimeError) -> String {
    let mut out = format!(
        "Runtime error: {} at {}:{}",
        error.error_string, error.file_spec, error.line_number
    );
    if !error.library_name.is_empty() {
        let _ = write!(out, " [{}]", error.library_name);
    }
    out
}
