//! Startup configuration for the JVM.

use jbridge_shared::errors::BridgeResult;

use super::constants::{PATH_SEPARATOR, vm_options};
use super::option_list::OptionList;

/// Options for creating (or configuring) the process JVM.
///
/// Size specs are passed through verbatim (`"512m"`, `"1g"`); the JVM
/// validates them.
///
/// # Examples
///
/// ```rust
/// use jbridge::VmOptions;
///
/// let opts = VmOptions::new()
///     .with_classpath("/opt/app/lib.jar")
///     .with_max_heap_size("512m");
/// assert!(opts.has_instance_only_options());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VmOptions {
    /// Path list appended after the base classpath.
    pub classpath: Option<String>,

    /// `-Xms` value.
    pub initial_heap_size: Option<String>,

    /// `-Xmx` value.
    pub max_heap_size: Option<String>,

    /// `-Xss` value.
    pub max_stack_size: Option<String>,

    /// Raw JVM options separated by `,`.
    pub extra_options: Option<String>,

    /// Classpath shipped with the embedding module, placed first.
    pub base_classpath: Option<String>,
}

impl VmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.classpath = Some(classpath.into());
        self
    }

    pub fn with_initial_heap_size(mut self, size: impl Into<String>) -> Self {
        self.initial_heap_size = Some(size.into());
        self
    }

    pub fn with_max_heap_size(mut self, size: impl Into<String>) -> Self {
        self.max_heap_size = Some(size.into());
        self
    }

    pub fn with_max_stack_size(mut self, size: impl Into<String>) -> Self {
        self.max_stack_size = Some(size.into());
        self
    }

    pub fn with_extra_options(mut self, options: impl Into<String>) -> Self {
        self.extra_options = Some(options.into());
        self
    }

    pub fn with_base_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.base_classpath = Some(classpath.into());
        self
    }

    /// Whether any option can only take effect when the JVM is created.
    ///
    /// Everything except the classpath is instance-only.
    pub fn has_instance_only_options(&self) -> bool {
        self.initial_heap_size.is_some()
            || self.max_heap_size.is_some()
            || self.max_stack_size.is_some()
            || self.extra_options.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Extra options split on the delimiter, empty pieces dropped.
    pub fn extra_option_list(&self) -> impl Iterator<Item = &str> {
        self.extra_options
            .as_deref()
            .unwrap_or_default()
            .split(vm_options::EXTRA_OPTION_DELIMITER)
            .filter(|opt| !opt.is_empty())
    }

    /// Base classpath, caller classpath and `appended` joined with the
    /// platform separator, or `None` if all are empty.
    pub fn effective_classpath(&self, appended: &[String]) -> Option<String> {
        let parts: Vec<&str> = self
            .base_classpath
            .as_deref()
            .into_iter()
            .chain(self.classpath.as_deref())
            .chain(appended.iter().map(String::as_str))
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(PATH_SEPARATOR))
        }
    }

    /// Build the creation option list.
    ///
    /// Order: classpath, `-Xms`, `-Xmx`, `-Xss`, then extra options. Fails
    /// with a configuration error past [`vm_options::MAX_OPTIONS`]; the
    /// partially built list is dropped before returning.
    pub fn to_option_list(&self, appended_classpath: &[String]) -> BridgeResult<OptionList> {
        let mut list = OptionList::new();

        if let Some(classpath) = self.effective_classpath(appended_classpath) {
            list.push(format!("{}{}", vm_options::CLASSPATH_PREFIX, classpath))?;
        }
        if let Some(size) = &self.initial_heap_size {
            list.push(format!("{}{}", vm_options::INITIAL_HEAP_PREFIX, size))?;
        }
        if let Some(size) = &self.max_heap_size {
            list.push(format!("{}{}", vm_options::MAX_HEAP_PREFIX, size))?;
        }
        if let Some(size) = &self.max_stack_size {
            list.push(format!("{}{}", vm_options::MAX_STACK_PREFIX, size))?;
        }
        for option in self.extra_option_list() {
            list.push(option.to_string())?;
        }

        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbridge_shared::errors::BridgeError;

    #[test]
    fn test_new_minimal() {
        let opts = VmOptions::new();
        assert!(!opts.has_instance_only_options());
        assert!(opts.effective_classpath(&[]).is_none());
        assert!(opts.to_option_list(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_classpath_is_not_instance_only() {
        let opts = VmOptions::new().with_classpath("/a");
        assert!(!opts.has_instance_only_options());
    }

    #[test]
    fn test_empty_extra_options_are_not_instance_only() {
        let opts = VmOptions::new().with_extra_options("");
        assert!(!opts.has_instance_only_options());

        let opts = VmOptions::new().with_extra_options("-verbose:gc");
        assert!(opts.has_instance_only_options());
    }

    #[test]
    fn test_option_order() {
        let opts = VmOptions::new()
            .with_classpath("/a")
            .with_initial_heap_size("64m")
            .with_max_heap_size("512m")
            .with_max_stack_size("1m")
            .with_extra_options("-Dx=1,,-Xcheck:jni");

        let list = opts.to_option_list(&[]).unwrap();
        let got: Vec<&str> = list.iter().collect();
        assert_eq!(
            got,
            [
                "-Djava.class.path=/a",
                "-Xms64m",
                "-Xmx512m",
                "-Xss1m",
                "-Dx=1",
                "-Xcheck:jni",
            ]
        );
    }

    #[test]
    fn test_effective_classpath_joins_base_first() {
        let sep = PATH_SEPARATOR;
        let opts = VmOptions::new()
            .with_base_classpath("/base.jar")
            .with_classpath("/app.jar");

        assert_eq!(
            opts.effective_classpath(&["/late.jar".to_string()]),
            Some(format!("/base.jar{sep}/app.jar{sep}/late.jar"))
        );
    }

    #[test]
    fn test_too_many_options() {
        let vmargs = (0..40).map(|i| format!("-Dk{i}=v")).collect::<Vec<_>>().join(",");
        let opts = VmOptions::new().with_extra_options(vmargs);

        let err = opts.to_option_list(&[]).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(err.to_string(), "Too many options (> 32)");
    }

    #[test]
    fn test_exactly_max_options_fit() {
        let vmargs = (0..vm_options::MAX_OPTIONS)
            .map(|i| format!("-Dk{i}=v"))
            .collect::<Vec<_>>()
            .join(",");
        let opts = VmOptions::new().with_extra_options(vmargs);

        assert_eq!(opts.to_option_list(&[]).unwrap().len(), vm_options::MAX_OPTIONS);
    }
}
