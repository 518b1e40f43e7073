#[cfg(test)]
mod tests {
    use clap::Parser;
    use midibusrs::*;
    use std::path::PathBuf;

    #[cfg(feature = "test-mock")]
    #[test]
    fn test_port_list() {
        let ports = handle_port_list();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0], "Mock Device 1");
        assert_eq!(ports[1], "Mock Device 2");
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["test"]);
        assert!(!args.port_list);
        assert!(!args.manual_ports);
        assert!(!args.watch);
        assert_eq!(args.config, None);
        assert_eq!(args.clock_test, None);
        assert_eq!(args.bpm, 120);
    }

    #[test]
    fn test_args_with_config_and_manual_ports() {
        let args = Args::parse_from(["test", "--config", "ports.toml", "--manual-ports"]);
        assert_eq!(args.config, Some(PathBuf::from("ports.toml")));
        assert!(args.manual_ports);
    }

    #[test]
    fn test_args_clock_test() {
        let args = Args::parse_from(["test", "--clock-test", "4", "--bpm", "90", "--watch"]);
        assert_eq!(args.clock_test, Some(4));
        assert_eq!(args.bpm, 90);
        assert!(args.watch);
    }

    #[test]
    fn test_args_reject_bad_bar_count() {
        assert!(Args::try_parse_from(["test", "--clock-test", "four"]).is_err());
    }
}
