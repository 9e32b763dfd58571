use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BYTES_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}";
const CHUNKS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>6}/{len:<6} chunks {percent:>3}% {msg}";

fn bar(len: u64, template: &str, message: String) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr_with_hz(5));
    let style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message(message);
    pb
}

/// Upload progress, counted in chunks.
pub fn chunk_bar(total_chunks: u64, filename: &str) -> ProgressBar {
    bar(total_chunks, CHUNKS_TEMPLATE, format!("Uploading {}", filename))
}

/// Download progress, counted in bytes. The length is set once the probe
/// reports it.
pub fn byte_bar(filename: &str) -> ProgressBar {
    bar(0, BYTES_TEMPLATE, format!("Downloading {}", filename))
}
