//! Model listing and endpoint checks for `aiterm models` and `aiterm check`.

use crate::api::ModelClient;
use std::error::Error;

pub fn render_model_list(models: &[String], current: &str) -> String {
    if models.is_empty() {
        return "No models installed on the endpoint. Pull one with `ollama pull <model>`.\n"
            .to_string();
    }
    let mut out = format!("Found {} models (newest first):\n\n", models.len());
    for model in models {
        if model == current {
            out.push_str(&format!("  • {model} (current)\n"));
        } else {
            out.push_str(&format!("  • {model}\n"));
        }
    }
    if !models.iter().any(|model| model == current) {
        out.push_str(&format!(
            "\n⚠️  The configured model '{current}' is not installed.\n"
        ));
    }
    out
}

pub async fn list_models(client: &dyn ModelClient) -> Result<(), Box<dyn Error>> {
    let models = client.list_models().await?;
    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    print!("{}", render_model_list(&models, client.model()));
    Ok(())
}

pub async fn check_model(client: &dyn ModelClient) -> Result<(), Box<dyn Error>> {
    let detail = client.test_connection().await?;
    println!("✅ {detail}");
    println!("   Model: {}", client.model());
    Ok(())
}
