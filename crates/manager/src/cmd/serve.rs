use anyhow::Result;
use utils::version;

use crate::app::ApplicationBuilder;
use crate::config::ServeArgs;
use crate::infrastructure::logging;

pub async fn run_serve(serve_args: ServeArgs) -> Result<()> {
    let _guard = logging::init(serve_args.log_file.as_deref())?;

    tracing::info!("Starting computation manager {}", &**version::VERSION);

    let app = ApplicationBuilder::new(serve_args).build()?;

    let result = app.run().await;
    app.shutdown().await?;

    result
}
