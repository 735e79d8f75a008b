//! Stylesheet minification with lightningcss.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

pub fn minify_stylesheet(source: &str, browserslist: &[String]) -> Result<String, String> {
    let browsers = Browsers::from_browserslist(browserslist)
        .map_err(|e| format!("invalid browserslist: {e}"))?;
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| format!("failed to parse stylesheet: {e}"))?;
    stylesheet
        .minify(MinifyOptions {
            targets: targets.clone(),
            ..MinifyOptions::default()
        })
        .map_err(|e| format!("failed to minify stylesheet: {e}"))?;
    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| format!("failed to print stylesheet: {e}"))?;
    Ok(printed.code)
}
