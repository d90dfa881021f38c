use std::path::PathBuf;

use tiergate_config::GateConfig;
use tiergate_core::GateError;

const HEADER: &str = "# tiergate configuration
#
# Every section is optional; missing keys fall back to the defaults below.
# Env overrides: TIERGATE_LOG_LEVEL, TIERGATE_LOG_FORMAT, TIERGATE_STATE_PATH,
# TIERGATE_INITIAL_TIER. Run `tiergate doctor` after editing.

";

pub(super) fn cmd_init(local: bool) -> tiergate_core::Result<()> {
    let dir = if local {
        std::env::current_dir()?
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tiergate")
    };

    std::fs::create_dir_all(&dir)?;
    let config_path = dir.join("tiergate.toml");

    if config_path.exists() {
        println!("⚠️  {} already exists", config_path.display());
        println!("   Run 'tiergate doctor' to check it.");
        return Ok(());
    }

    // Write the full default catalog so every threshold is visible and editable
    let body = toml::to_string_pretty(&GateConfig::default())
        .map_err(|e| GateError::Config(e.to_string()))?;
    std::fs::write(&config_path, format!("{HEADER}{body}"))?;

    println!("✅ Created {}", config_path.display());
    println!("   Review the tier table, then run: tiergate run");
    Ok(())
}
