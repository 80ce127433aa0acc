//! End-to-end tests against a real temporary directory: the full
//! resolve → generate → cache → serve cycle, concurrent generation, and
//! the web-tier fallback dispatch.

use std::sync::Arc;
use std::thread;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use thumbcache::config::ThumbcacheConfig;
use thumbcache::fallback::FallbackDispatcher;
use thumbcache::service::{Resolution, ThumbnailService, VariantRequest};
use thumbcache::signing::SignedUrlAuthority;
use thumbcache::storage::{DiskStorage, Storage};
use thumbcache::TransformMethod;

fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
    }
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn setup() -> (TempDir, Arc<ThumbnailService>) {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(DiskStorage::new(tmp.path()));
    storage
        .write("photos/sunset.jpg", &gradient_jpeg(640, 480))
        .unwrap();
    let service = Arc::new(ThumbnailService::new(
        Arc::new(ThumbcacheConfig::default()),
        storage,
    ));
    (tmp, service)
}

#[test]
fn full_cycle_on_disk() {
    let (tmp, service) = setup();

    let request = VariantRequest::new("photos/sunset.jpg", "medium");
    let first = service.resolve(&request).unwrap();
    assert!(first.was_generated());
    assert_eq!(first.path(), "photos/thumbnails/sunset_thumb_medium.jpg");

    let on_disk = tmp.path().join("photos/thumbnails/sunset_thumb_medium.jpg");
    assert!(on_disk.is_file());

    // 640x480 into a 300x300 box: width binds.
    let img = image::open(&on_disk).unwrap();
    assert_eq!((img.width(), img.height()), (300, 225));

    // Second resolution is a pure cache hit.
    let second = service.resolve(&request).unwrap();
    assert_eq!(second, Resolution::Cached(first.path().to_string()));
}

#[test]
fn each_size_gets_its_own_artifact() {
    let (tmp, service) = setup();

    for size in ["small", "medium", "large"] {
        service
            .resolve(&VariantRequest::new("photos/sunset.jpg", size))
            .unwrap();
    }

    let cache_dir = tmp.path().join("photos/thumbnails");
    let mut names: Vec<String> = std::fs::read_dir(&cache_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "sunset_thumb_large.jpg",
            "sunset_thumb_medium.jpg",
            "sunset_thumb_small.jpg",
        ]
    );
}

#[test]
fn crop_and_fit_produce_exact_boxes_on_disk() {
    let (tmp, service) = setup();

    for (method, suffix) in [(TransformMethod::Crop, "crop"), (TransformMethod::Fit, "fit")] {
        let request =
            VariantRequest::new("photos/sunset.jpg", "small").with_method(method);
        let resolution = service.resolve(&request).unwrap();
        // Method overrides get their own cache file.
        assert_eq!(
            resolution.path(),
            format!("photos/thumbnails/sunset_thumb_small-{suffix}.jpg")
        );
        let img = image::open(tmp.path().join(resolution.path())).unwrap();
        assert_eq!((img.width(), img.height()), (150, 150), "{method:?}");
    }
}

#[test]
fn concurrent_requests_generate_exactly_once() {
    let (tmp, service) = setup();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(thread::spawn(move || {
            service
                .resolve(&VariantRequest::new("photos/sunset.jpg", "small"))
                .unwrap()
        }));
    }
    let resolutions: Vec<Resolution> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let generated = resolutions.iter().filter(|r| r.was_generated()).count();
    assert_eq!(generated, 1, "exactly one thread generates");
    assert!(
        resolutions
            .iter()
            .all(|r| r.path() == "photos/thumbnails/sunset_thumb_small.jpg")
    );

    // One complete artifact, no stray temp files.
    let entries: Vec<_> = std::fs::read_dir(tmp.path().join("photos/thumbnails"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["sunset_thumb_small.jpg"]);
    image::open(tmp.path().join("photos/thumbnails/sunset_thumb_small.jpg")).unwrap();
}

#[test]
fn dispatcher_materializes_misses_on_disk() {
    let (tmp, service) = setup();
    let dispatcher = FallbackDispatcher::new(service);

    let response = dispatcher
        .dispatch("photos/thumbnails/sunset_thumb_large.jpg", None, None)
        .unwrap()
        .unwrap();
    assert!(response.generated);
    assert_eq!(response.content_type, "image/jpeg");

    let served = image::load_from_memory(&response.bytes).unwrap();
    assert_eq!((served.width(), served.height()), (600, 450));
    assert!(
        tmp.path()
            .join("photos/thumbnails/sunset_thumb_large.jpg")
            .is_file()
    );
}

#[test]
fn signed_dispatch_round_trip_on_disk() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(DiskStorage::new(tmp.path()));
    storage
        .write("photos/sunset.jpg", &gradient_jpeg(320, 240))
        .unwrap();
    let config = ThumbcacheConfig::from_toml(
        r#"
        [signed_urls]
        enabled = true
        secret = "integration-secret"
        "#,
    )
    .unwrap();
    let service = Arc::new(ThumbnailService::new(Arc::new(config), storage));
    let dispatcher = FallbackDispatcher::new(service);

    let path = "photos/thumbnails/sunset_thumb_small.jpg";
    let token = SignedUrlAuthority::new("integration-secret", 3600).sign(path, None, None);

    assert!(dispatcher.dispatch(path, None, None).is_err());
    let response = dispatcher
        .dispatch(path, Some(&token.to_query()), None)
        .unwrap()
        .unwrap();
    assert!(response.generated);
}

#[test]
fn invalidation_clears_disk_state() {
    let (tmp, service) = setup();
    let storage = DiskStorage::new(tmp.path());
    storage
        .write("avatars/9/me.jpg", &gradient_jpeg(200, 200))
        .unwrap();

    service
        .resolve(&VariantRequest::new("photos/sunset.jpg", "small"))
        .unwrap();
    service
        .resolve(&VariantRequest::new("avatars/9/me.jpg", "small"))
        .unwrap();

    assert_eq!(service.delete_variants("photos/sunset.jpg").unwrap(), 1);
    assert!(!tmp.path().join("photos/thumbnails/sunset_thumb_small.jpg").exists());

    assert_eq!(service.clear_all(None).unwrap(), 2);
    assert!(!tmp.path().join("avatars/9/thumbnails").exists());
    // Originals survive.
    assert!(tmp.path().join("photos/sunset.jpg").is_file());
    assert!(tmp.path().join("avatars/9/me.jpg").is_file());
}
