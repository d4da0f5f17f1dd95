use anyhow::Result;
use inquire::Confirm;
use storysmoosh::core::catalog::OptionCatalog;
use storysmoosh::core::config::Config;
use storysmoosh::services::image::create_image_generator;
use storysmoosh::services::llm::create_text_generator;
use storysmoosh::services::setup::{collect_selection, resolve_api_key};
use storysmoosh::services::workflow::StoryPipeline;
use storysmoosh::ui::{Presenter, TerminalPresenter};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load Config
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Err(e);
        }
    };

    let presenter = TerminalPresenter::new();
    presenter.welcome();

    // 2. Credential, handed to both clients explicitly
    let api_key = resolve_api_key(&config)?;
    let text = create_text_generator(&config, api_key.clone());
    let image = create_image_generator(&config, api_key);
    let pipeline = StoryPipeline::new(config.pipeline.clone(), text, image);

    // 3. Selection + Generation
    let catalog = OptionCatalog::new();
    loop {
        let selection = collect_selection(&config, &catalog)?;
        pipeline.run(&selection, &presenter).await;

        if config.unattended {
            break;
        }
        let again = Confirm::new("Generate another story?")
            .with_default(false)
            .prompt()?;
        if !again {
            break;
        }
    }

    Ok(())
}
