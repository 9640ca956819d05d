//! Constants for JVM creation and configuration.

pub use jbridge_shared::constants::{java_classes, status};

/// JVM option list limits and formatting.
pub mod vm_options {
    /// Maximum number of options handed to the JVM at creation.
    pub const MAX_OPTIONS: usize = 32;

    pub const CLASSPATH_PREFIX: &str = "-Djava.class.path=";
    pub const INITIAL_HEAP_PREFIX: &str = "-Xms";
    pub const MAX_HEAP_PREFIX: &str = "-Xmx";
    pub const MAX_STACK_PREFIX: &str = "-Xss";

    /// Separator between raw options in `vmargs`.
    pub const EXTRA_OPTION_DELIMITER: char = ',';
}

/// Platform classpath separator.
#[cfg(windows)]
pub const PATH_SEPARATOR: &str = ";";

/// Platform classpath separator.
#[cfg(not(windows))]
pub const PATH_SEPARATOR: &str = ":";

pub mod envs {
    /// Log filter for the bridge (`tracing_subscriber::EnvFilter` syntax).
    pub const JBRIDGE_LOG: &str = "JBRIDGE_LOG";
}

pub mod logging {
    /// Filter used when `JBRIDGE_LOG` is unset or invalid.
    pub const DEFAULT_FILTER: &str = "warn";
}

/// Java-side names used by the JNI backend.
pub mod java {
    pub const SYSTEM: &str = "java/lang/System";
    pub const OBJECT: &str = "java/lang/Object";
    pub const CLASS: &str = "java/lang/Class";
    pub const THROWABLE: &str = "java/lang/Throwable";
    pub const PRINT_STREAM: &str = "java/io/PrintStream";
    pub const BYTE_ARRAY_OUTPUT_STREAM: &str = "java/io/ByteArrayOutputStream";

    pub const CLASSPATH_PROPERTY: &str = "java.class.path";
    pub const VERSION_PROPERTY: &str = "java.version";
}
