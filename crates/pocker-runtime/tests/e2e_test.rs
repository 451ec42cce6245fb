//! Privileged end-to-end test on a real Linux host.
//!
//! Needs root, cgroup v1 `cpu` and `memory` controllers and overlayfs.
//! Run with:
//!
//! ```text
//! POCKER_E2E_IMAGE_DIR=/srv/images POCKER_E2E_IMAGE=busybox \
//!     cargo test -p pocker-runtime --test e2e_test -- --ignored
//! ```
//!
//! The image must provide `/bin/sh` and `sleep`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use pocker_common::config::PockerConfig;
use pocker_common::types::{LaunchRequest, LaunchStatus, ResourceLimits};
use pocker_runtime::engine::{Engine, StopOutcome};

fn setup(containers: &tempfile::TempDir, grace: u64) -> (Engine, String, String) {
    let image_dir = std::env::var("POCKER_E2E_IMAGE_DIR").expect("POCKER_E2E_IMAGE_DIR");
    let image = std::env::var("POCKER_E2E_IMAGE").unwrap_or_else(|_| "busybox".into());
    let config = PockerConfig {
        image_dir: image_dir.clone().into(),
        container_dir: containers.path().to_path_buf(),
        stop_grace_secs: grace,
        ..PockerConfig::default()
    };
    (Engine::native(config).unwrap(), image_dir, image)
}

#[test]
#[ignore = "requires root, cgroup v1 and an image archive"]
fn echo_hi_in_real_container() {
    let containers = tempfile::tempdir().unwrap();
    let (engine, image_dir, image) = setup(&containers, 10);
    let request = LaunchRequest::builder(
        image,
        vec!["/bin/sh".into(), "-c".into(), "echo hi".into()],
    )
    .image_dir(image_dir)
    .container_dir(containers.path())
    .limits(ResourceLimits::default())
    .build()
    .unwrap();

    let report = engine.run(&request).unwrap();
    assert_eq!(report.status, LaunchStatus::Exited { code: 0 });

    engine.remove(&report.id).unwrap();
}

#[test]
#[ignore = "requires root, cgroup v1 and an image archive"]
fn stop_kills_namespace_init_without_sigterm_handler() {
    let containers = tempfile::tempdir().unwrap();
    let (engine, image_dir, image) = setup(&containers, 1);
    let request = LaunchRequest::builder(image, vec!["sleep".into(), "30".into()])
        .image_dir(image_dir)
        .container_dir(containers.path())
        .limits(ResourceLimits::default())
        .build()
        .unwrap();

    let handle = engine.start(&request).unwrap();
    let id = handle.id().clone();
    std::thread::sleep(std::time::Duration::from_millis(500));

    // `sleep` runs as PID 1 of its namespace and never sees the SIGTERM.
    assert_eq!(engine.stop(&id).unwrap(), StopOutcome::Killed);
    let report = handle.wait().unwrap();
    assert_eq!(report.status, LaunchStatus::Signaled { signal: 9 });

    engine.remove(&id).unwrap();
}
