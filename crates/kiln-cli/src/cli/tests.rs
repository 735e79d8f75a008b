#[cfg(test)]
mod tests {
    use crate::cli::{CheckFormat, Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_build_defaults() {
        let cli = Cli::try_parse_from(["kiln", "build"]).unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert!(args.project.mode.is_none());
        assert!(args.out_dir.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_build_with_mode_and_root() {
        let cli = Cli::try_parse_from([
            "kiln", "build", "--mode", "production", "--root", "app", "-d", "public_html",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.project.mode.as_deref(), Some("production"));
        assert_eq!(args.project.root, Some(PathBuf::from("app")));
        assert_eq!(args.out_dir, Some(PathBuf::from("public_html")));
    }

    #[test]
    fn test_dev_server_flags() {
        let cli =
            Cli::try_parse_from(["kiln", "dev", "--port", "8080", "--host", "0.0.0.0", "--no-open"])
                .unwrap();
        let Command::Dev(args) = cli.command else {
            panic!("expected dev");
        };
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert!(args.no_open);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["kiln", "dev", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["kiln", "check", "--quiet", "--no-color"]).unwrap();
        assert!(cli.quiet);
        assert!(cli.no_color);
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.format, CheckFormat::Toml);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["kiln", "build", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_mode_is_not_validated_by_clap() {
        // Parsed later so KILN_MODE and NODE_ENV get the same error.
        let cli = Cli::try_parse_from(["kiln", "build", "--mode", "staging"]).unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.project.mode.as_deref(), Some("staging"));
    }
}
