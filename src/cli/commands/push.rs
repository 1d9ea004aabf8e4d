//! Push command - publish an image to its registry

use super::open_image_session;
use crate::cli::args::ImageArgs;
use crate::config::Config;
use crate::engine::ImageName;
use crate::error::CairnResult;
use console::style;

/// Execute the push command
pub async fn execute(args: ImageArgs, config: &Config) -> CairnResult<()> {
    let image: ImageName = args.image.parse()?;
    let mut session = open_image_session(config).await?;
    session.push_image(&image).await?;

    println!("{} Pushed {}", style("✓").green(), style(&image).cyan());
    Ok(())
}
