use clap::Parser;
use hlsgrab_engine::hls::{IvScheme, SegmentPadding};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "HLS rendition downloader",
    long_about = "Downloads the highest-resolution rendition of an HLS master playlist.\n\
                  \n\
                  Segments are fetched in parallel, AES-128 segments are decrypted, and\n\
                  the video and audio streams are reassembled in playlist order before\n\
                  being muxed into a single container with ffmpeg (stream copy)."
)]
pub struct CliArgs {
    /// Name of the run; also the output directory and container name
    #[arg(help = "Name for this download (used for the run directory and output file)")]
    pub name: String,

    /// Master (or media) playlist URL
    #[arg(help = "URL of the HLS master playlist")]
    pub master_url: String,

    /// Directory that holds run directories
    #[arg(short, long, default_value = ".", help = "Parent directory for the run directory")]
    pub output_dir: PathBuf,

    /// Skip runs whose directory already exists
    #[arg(long, help = "Exit successfully if the run directory already exists")]
    pub skip: bool,

    /// Reuse an existing run directory
    #[arg(
        long,
        conflicts_with = "skip",
        help = "Download again into an existing run directory, overwriting its files"
    )]
    pub force: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'c',
        long,
        default_value = "4",
        help = "Maximum number of concurrent segment downloads"
    )]
    pub concurrency: usize,

    #[arg(
        long,
        default_value = "0",
        help = "Retry attempts for a failed segment download (0 fails the run on the first error)"
    )]
    pub retries: u32,

    /// Segment timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Timeout for individual segment downloads in seconds"
    )]
    pub segment_timeout: u64,

    /// Overall HTTP timeout in seconds
    #[arg(
        long,
        default_value = "60",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        value_enum,
        default_value_t = IvScheme::LowByte,
        help = "How segment IVs are derived from sequence numbers"
    )]
    pub iv_scheme: IvScheme,

    #[arg(
        long,
        value_enum,
        default_value_t = SegmentPadding::Keep,
        help = "Padding handling for decrypted segments"
    )]
    pub padding: SegmentPadding,

    #[arg(
        long,
        help = "Keep segments in memory instead of writing them under the run directory"
    )]
    pub in_memory: bool,

    #[arg(long, help = "Stop after reassembling the streams; do not run ffmpeg")]
    pub no_mux: bool,

    #[arg(long, help = "Path to the ffmpeg binary (default: looked up on PATH)")]
    pub ffmpeg: Option<PathBuf>,

    #[arg(
        long,
        default_value = "mp4",
        help = "Container extension for the muxed output"
    )]
    pub container: String,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    #[arg(long, help = "Override the User-Agent header")]
    pub user_agent: Option<String>,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "all",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    /// Show progress bars
    #[arg(short = 'P', long = "progress", help = "Show per-track download progress bars")]
    pub show_progress: bool,
}

/// Splits a `Name: Value` header argument at its first colon
pub fn split_header(header: &str) -> Option<(&str, &str)> {
    let (name, value) = header.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_and_flags() {
        let args = CliArgs::parse_from([
            "hlsgrab",
            "episode-1",
            "https://cdn.example.com/master.m3u8",
            "-o",
            "/tmp/out",
            "-c",
            "8",
            "--iv-scheme",
            "big-endian-counter",
            "--padding",
            "pkcs7",
            "-H",
            "Referer: https://example.com/",
        ]);
        assert_eq!(args.name, "episode-1");
        assert_eq!(args.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(args.concurrency, 8);
        assert_eq!(args.retries, 0);
        assert_eq!(args.iv_scheme, IvScheme::BigEndianCounter);
        assert_eq!(args.padding, SegmentPadding::Pkcs7);
        assert_eq!(args.headers.len(), 1);
    }

    #[test]
    fn skip_and_force_conflict() {
        let result = CliArgs::try_parse_from(["hlsgrab", "n", "http://h/m.m3u8", "--skip", "--force"]);
        assert!(result.is_err());
    }

    #[test]
    fn header_splits_on_first_colon() {
        assert_eq!(
            split_header("Referer: https://example.com:8443/x"),
            Some(("Referer", "https://example.com:8443/x"))
        );
        assert_eq!(split_header("no-colon"), None);
        assert_eq!(split_header(": value"), None);
    }
}
