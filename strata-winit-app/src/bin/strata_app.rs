use strata_crate_tools::config::OptionSeed;
use strata_winit_app::app::WinitApp;

/// 用法：`strata [options.toml]`
fn main() -> anyhow::Result<()> {
    let seed = match std::env::args().nth(1) {
        Some(path) => Some(OptionSeed::from_file(path)?),
        None => None,
    };
    WinitApp::run(seed)
}
