//! Pull command - fetch an image unless the engine already has it

use super::open_image_session;
use crate::cli::args::ImageArgs;
use crate::config::Config;
use crate::error::CairnResult;
use console::style;

/// Execute the pull command
pub async fn execute(args: ImageArgs, config: &Config) -> CairnResult<()> {
    let mut session = open_image_session(config).await?;
    let image = session.ensure_image(&args.image, "pull").await?;

    println!(
        "{} {} is present ({})",
        style("✓").green(),
        style(&args.image).cyan(),
        image.id
    );
    Ok(())
}
