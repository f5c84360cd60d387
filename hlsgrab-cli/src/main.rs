use std::time::Duration;

use clap::Parser;
use hlsgrab_engine::{
    DownloaderConfig, HlsConfig, HlsPipeline, Muxer, ProxyAuth, ProxyConfig, ProxyType,
    RunContext,
};
use indicatif::{HumanBytes, MultiProgress};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod utils;

use cli::{CliArgs, split_header};
use error::AppError;
use utils::progress::ProgressManager;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn proxy_config(args: &CliArgs) -> Result<Option<ProxyConfig>, AppError> {
    if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        return Ok(None);
    }
    let Some(proxy_url) = args.proxy.as_ref() else {
        return Ok(None);
    };

    let proxy_type = match args.proxy_type.as_str() {
        "http" => ProxyType::Http,
        "https" => ProxyType::Https,
        "socks5" => ProxyType::Socks5,
        "all" => ProxyType::All,
        other => {
            return Err(AppError::InvalidInput(format!(
                "Invalid proxy type: '{other}'"
            )));
        }
    };

    let auth = match (&args.proxy_user, &args.proxy_pass) {
        (Some(username), Some(password)) => Some(ProxyAuth {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    info!(
        proxy_url = %proxy_url,
        proxy_type = ?proxy_type,
        has_auth = auth.is_some(),
        "Using explicit proxy configuration"
    );
    Ok(Some(ProxyConfig {
        url: proxy_url.clone(),
        proxy_type,
        auth,
    }))
}

fn download_config(args: &CliArgs) -> Result<DownloaderConfig, AppError> {
    let mut builder = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));

    for header in &args.headers {
        match split_header(header) {
            Some((name, value)) => builder = builder.with_header(name, value),
            None => warn!(header = %header, "Ignoring header, expected 'Name: Value'"),
        }
    }
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent.clone());
    }

    builder = match proxy_config(args)? {
        Some(proxy) => builder.with_proxy(proxy),
        None => builder.with_system_proxy(!args.no_proxy),
    };
    Ok(builder.build())
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("hlsgrab.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let ctx = RunContext::new(args.output_dir.join(&args.name));
    if ctx.exists() {
        if args.skip {
            info!(path = %ctx.root().display(), "Run directory exists, skipping");
            return Ok(());
        }
        if !args.force {
            return Err(AppError::InvalidInput(format!(
                "{} already exists (use --skip or --force)",
                ctx.root().display()
            )));
        }
        warn!(path = %ctx.root().display(), "Run directory exists, overwriting");
    }

    let hls_config = HlsConfig::builder()
        .with_base_config(download_config(&args)?)
        .download_concurrency(args.concurrency)
        .segment_retry_count(args.retries)
        .segment_download_timeout(Duration::from_secs(args.segment_timeout))
        .iv_scheme(args.iv_scheme)
        .padding(args.padding)
        .persist_segments(!args.in_memory)
        .build();

    info!(
        name = %args.name,
        url = %args.master_url,
        concurrency = hls_config.fetcher_config.download_concurrency,
        retries = hls_config.fetcher_config.max_segment_retries,
        "Starting download"
    );

    // Resolve ffmpeg before spending time on the download
    let muxer = if args.no_mux {
        None
    } else {
        Some(match &args.ffmpeg {
            Some(path) => Muxer::new(path.clone()),
            None => Muxer::locate()?,
        })
    };

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            ctrl_c_token.cancel();
        }
    });
    let ctx = ctx.with_cancellation(cancel);

    let multi = MultiProgress::new();
    let progress = if args.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };

    let pipeline = HlsPipeline::new(hls_config)?.on_event(move |event| progress.handle_event(event));
    let output = pipeline.run(&args.master_url, &ctx).await?;

    info!(
        video = %output.video.path.display(),
        video_size = %HumanBytes(output.video.bytes),
        audio = ?output.audio.as_ref().map(|a| a.path.display().to_string()),
        "Streams reassembled"
    );

    if let Some(muxer) = muxer {
        let target = ctx.muxed_output_path(&args.container);
        muxer
            .mux(
                &output.video.path,
                output.audio.as_ref().map(|a| a.path.as_path()),
                &target,
            )
            .await?;
        info!(output = %target.display(), "Done");
    }

    Ok(())
}
