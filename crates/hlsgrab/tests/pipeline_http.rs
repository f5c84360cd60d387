use aes::Aes128;
use cipher::block_padding::Pkcs7;
use cipher::{BlockEncryptMut, KeyIvInit};
use hlsgrab_engine::hls::decryption::derive_iv;
use hlsgrab_engine::hls::{IvScheme, RunContext, SegmentPadding, TrackKind};
use hlsgrab_engine::{DownloaderConfig, HlsConfig, HlsError, HlsPipeline};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: [u8; 16] = [
    0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
];

fn pipeline() -> HlsPipeline {
    pipeline_with_padding(SegmentPadding::default())
}

fn pipeline_with_padding(padding: SegmentPadding) -> HlsPipeline {
    let base = DownloaderConfig::builder().with_system_proxy(false).build();
    HlsPipeline::new(
        HlsConfig::builder()
            .with_base_config(base)
            .padding(padding)
            .build(),
    )
    .expect("client should build")
}

fn encrypt(plain: &[u8], sequence: u64) -> Vec<u8> {
    cbc::Encryptor::<Aes128>::new_from_slices(&KEY, &derive_iv(sequence, IvScheme::LowByte))
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plain)
}

fn media_playlist(key_line: Option<&str>, segments: &[&str]) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
    if let Some(line) = key_line {
        text.push_str(line);
        text.push('\n');
    }
    for seg in segments {
        text.push_str(&format!("#EXTINF:6.0,\n{seg}\n"));
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}

async fn serve(server: &MockServer, at: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn picks_1080p_with_its_audio_group() {
    let server = MockServer::start().await;
    let master = "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"grp1\",NAME=\"main\",DEFAULT=YES,URI=\"audio/index.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=6000000,RESOLUTION=1920x1080,AUDIO=\"grp1\"
1080p/index.m3u8
";
    serve(&server, "/vod/master.m3u8", master).await;
    serve(&server, "/vod/1080p/index.m3u8", media_playlist(None, &["v0.ts", "v1.ts"])).await;
    serve(&server, "/vod/audio/index.m3u8", media_playlist(None, &["a0.aac"])).await;
    serve(&server, "/vod/1080p/v0.ts", "video-0|").await;
    serve(&server, "/vod/1080p/v1.ts", "video-1|").await;
    serve(&server, "/vod/audio/a0.aac", "audio-0").await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path().join("episode"));
    let output = pipeline()
        .run(&format!("{}/vod/master.m3u8", server.uri()), &ctx)
        .await
        .unwrap();

    assert_eq!(
        output.video.playlist_uri,
        format!("{}/vod/1080p/index.m3u8", server.uri())
    );
    assert_eq!(
        std::fs::read_to_string(ctx.stream_path(TrackKind::Video)).unwrap(),
        "video-0|video-1|"
    );
    let audio = output.audio.expect("audio track");
    assert_eq!(std::fs::read_to_string(&audio.path).unwrap(), "audio-0");

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.url.path().contains("360p")));
}

#[tokio::test]
async fn decrypts_three_aes_segments() {
    let server = MockServer::start().await;
    let plains: [&[u8]; 3] = [
        b"first segment payload",
        b"second segment, somewhat longer payload text",
        b"third",
    ];
    serve(
        &server,
        "/live/index.m3u8",
        media_playlist(
            Some("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\""),
            &["s0.ts", "s1.ts", "s2.ts"],
        ),
    )
    .await;
    serve(&server, "/live/key.bin", KEY.to_vec()).await;
    for (i, plain) in plains.iter().enumerate() {
        // sequence numbers 1, 2, 3
        serve(&server, &format!("/live/s{i}.ts"), encrypt(plain, i as u64 + 1)).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    // segments carry PKCS#7 padding
    let output = pipeline_with_padding(SegmentPadding::Pkcs7)
        .run(&format!("{}/live/index.m3u8", server.uri()), &ctx)
        .await
        .unwrap();

    let expected: Vec<u8> = plains.concat();
    assert_eq!(std::fs::read(&output.video.path).unwrap(), expected);
    assert_eq!(output.video.bytes, expected.len() as u64);
    assert!(output.video.encrypted);
    assert_eq!(std::fs::read(ctx.key_path(TrackKind::Video)).unwrap(), KEY);
    assert_eq!(
        std::fs::read(ctx.decrypted_segment_path(TrackKind::Video, 1)).unwrap(),
        plains[1]
    );
}

#[tokio::test]
async fn server_error_on_third_segment_fails_the_run() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/live/index.m3u8",
        media_playlist(None, &["s0.ts", "s1.ts", "s2.ts"]),
    )
    .await;
    serve(&server, "/live/s0.ts", "zero").await;
    serve(&server, "/live/s1.ts", "one").await;
    Mock::given(method("GET"))
        .and(path("/live/s2.ts"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    let err = pipeline()
        .run(&format!("{}/live/index.m3u8", server.uri()), &ctx)
        .await
        .unwrap_err();

    match err {
        HlsError::Fetch { index, uri, reason } => {
            assert_eq!(index, Some(2));
            assert!(uri.ends_with("/live/s2.ts"));
            assert!(reason.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!ctx.stream_path(TrackKind::Video).exists());
}

#[tokio::test]
async fn short_key_is_rejected_before_segments_are_fetched() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/live/index.m3u8",
        media_playlist(
            Some("#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\""),
            &["s0.ts"],
        ),
    )
    .await;
    serve(&server, "/live/key.bin", vec![0u8; 8]).await;

    let dir = tempfile::tempdir().unwrap();
    let err = pipeline()
        .run(
            &format!("{}/live/index.m3u8", server.uri()),
            &RunContext::new(dir.path()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HlsError::KeyFormat { length: 8, .. }));
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.url.path().ends_with(".ts")));
}
