use crate::providers::openai_compat::OpenAiCompatProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub fn openai_provider(api_key: String, base_url: Option<String>, model: Option<String>) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        "openai",
        base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        api_key,
        model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
    )
}
