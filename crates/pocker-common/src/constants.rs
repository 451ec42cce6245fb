//! System-wide constants and default paths.

/// Default directory holding image archives and their cached extractions.
pub const DEFAULT_IMAGE_DIR: &str = "./_pocker/images";

/// Default directory holding per-container directories.
pub const DEFAULT_CONTAINER_DIR: &str = "./_pocker/containers";

/// Image launched when none is requested.
pub const DEFAULT_IMAGE: &str = "ubuntu";

/// Extension of image archives (`<image_dir>/<name>.tar`).
pub const IMAGE_SUFFIX: &str = "tar";

/// Gzip-compressed archive extensions probed after [`IMAGE_SUFFIX`].
pub const COMPRESSED_IMAGE_SUFFIXES: [&str; 2] = ["tar.gz", "tgz"];

/// Name of the extracted image tree and of the container mount point.
pub const ROOTFS_DIR: &str = "rootfs";

/// Name of the writable overlay upper layer.
pub const DIFF_DIR: &str = "diff";

/// Name of the overlay scratch directory.
pub const WORKER_DIR: &str = "worker";

/// Transient directory the host root is moved to during `pivot_root`.
pub const OLD_ROOT_DIR: &str = "old_root";

/// Per-container state record file name.
pub const STATE_FILE: &str = "state.json";

/// cgroup v1 CPU controller mount point.
pub const CPU_CGROUP_ROOT: &str = "/sys/fs/cgroup/cpu";

/// cgroup v1 memory controller mount point.
pub const MEMORY_CGROUP_ROOT: &str = "/sys/fs/cgroup/memory";

/// Group directory that holds every container leaf inside a controller.
pub const CGROUP_GROUP: &str = "pocker";

/// Exit status of a container-init process that failed before `exec`.
///
/// Distinct from the codes a launched command reports: the supervisor also
/// receives a structured failure report, so it never guesses from the code.
pub const SETUP_FAILURE_EXIT_CODE: i32 = 125;

/// Seconds between `SIGTERM` and `SIGKILL` when stopping a container.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "POCKER_CONFIG";
