//! # Configuration Flows
//!
//! The environment as the kernel and its pools see it: files on disk,
//! process properties and substitution, read once and frozen.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use kernel_runtime::{ConfigStore, Kernel, ProcessProperties};
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_kernel_reads_layered_environment() {
        let work = TempDir::new().unwrap();
        let conf = TempDir::new().unwrap();
        write(&work, "app.properties", "sys.name = orders\nbase = /srv\nlog.dir = ${base}/log\n");
        write(&work, "app-prod.properties", "base = /opt\n");
        write(&conf, "app-prod.properties", "sys.exec.corePoolSize = 3\n");

        let props = ProcessProperties::from_args([
            "-Dprofile=prod".to_string(),
            format!("--configdir={}", conf.path().display()),
            "--sys.id=orders-1".to_string(),
        ]);
        let kernel = Kernel::builder()
            .config(
                ConfigStore::builder()
                    .working_dir(work.path())
                    .properties(props),
            )
            .build();

        assert_eq!(kernel.name(), "orders");
        assert_eq!(kernel.id(), "orders-1");
        assert_eq!(kernel.env().profile(), Some("prod"));
        assert_eq!(kernel.env().get("log.dir"), Some("/opt/log"));
        assert_eq!(kernel.shared_pool().core_size(), 3);
        kernel.shutdown();
    }

    #[test]
    fn test_environment_built_once() {
        let work = TempDir::new().unwrap();
        write(&work, "app.properties", "greeting = hello\n");
        let kernel = Kernel::builder()
            .config(ConfigStore::builder().working_dir(work.path()))
            .build();

        assert_eq!(kernel.env().get("greeting"), Some("hello"));
        write(&work, "app.properties", "greeting = changed\n");
        assert_eq!(kernel.env().get("greeting"), Some("hello"));
    }

    #[test]
    fn test_bundled_defaults_and_override_hook() {
        let kernel = Kernel::builder()
            .config(
                ConfigStore::builder()
                    .without_working_dir()
                    .bundled("app.properties", "mode = bundled\nretries = 2\n")
                    .override_with(|values| {
                        values.insert("retries".to_string(), "${mode}-5".to_string());
                    }),
            )
            .build();

        assert_eq!(kernel.env().get("mode"), Some("bundled"));
        assert_eq!(kernel.env().get("retries"), Some("bundled-5"));
        assert_eq!(kernel.env().get_or("missing", 9u32), 9);
    }

    #[test]
    fn test_service_pool_settings_from_environment() {
        let kernel = Kernel::builder()
            .config(
                ConfigStore::builder()
                    .without_working_dir()
                    .property("sys.exec.upThreshold", "7")
                    .property("search.exec.corePoolSize", "3"),
            )
            .build();
        struct Search;
        impl kernel_runtime::Service for Search {}
        kernel.add("search", Arc::new(Search));

        let exec = kernel.executor_of("search").unwrap();
        assert!(exec.local().is_none());
        let config = kernel_runtime::exec::PoolConfig::local("search", kernel.env());
        assert_eq!(config.core_size, 3);
        assert_eq!(
            config.admission,
            kernel_runtime::exec::Admission::Threshold { up_threshold: 7 }
        );
        kernel.shutdown();
    }
}
