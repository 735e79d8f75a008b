use clap::ValueEnum;

/// How `kiln check` prints the effective configuration.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum CheckFormat {
    /// The resolved configuration as TOML
    #[default]
    #[value(name = "toml")]
    Toml,

    /// The resolved configuration as JSON
    #[value(name = "json")]
    Json,

    /// Only report whether the configuration is valid
    #[value(name = "none")]
    None,
}
