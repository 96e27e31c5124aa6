use std::sync::Arc;

use secrecy::SecretString;
use tower_http::cors::CorsLayer;

use krishi_assist::agent::{ConfidenceGuardrail, QueryDispatcher, ToolCallingAgent};
use krishi_assist::channels::{app, voice, whatsapp, AppContext};
use krishi_assist::config::AssistantConfig;
use krishi_assist::engine::Assistant;
use krishi_assist::geo::NominatimGeocoder;
use krishi_assist::llm::{create_provider, LlmBackend, LlmConfig, LlmClassifier};
use krishi_assist::onboarding::OnboardingManager;
use krishi_assist::rag::HttpRagEngine;
use krishi_assist::store::{Database, LibSqlBackend};
use krishi_assist::tools::{DiseaseLookupTool, MarketPriceTool, Tool, WeatherForecastTool};
use krishi_assist::translate::{GoogleTranslateApi, TranslationGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: GEMINI_API_KEY not set");
        eprintln!("  export GEMINI_API_KEY=...");
        std::process::exit(1);
    });

    let model = std::env::var("KRISHI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

    let port: u16 = std::env::var("KRISHI_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let db_path =
        std::env::var("KRISHI_DB_PATH").unwrap_or_else(|_| "./data/krishi-assist.db".to_string());

    let weather_api_key = std::env::var("WEATHER_API_KEY").unwrap_or_default();
    if weather_api_key.is_empty() {
        eprintln!("   Warning: WEATHER_API_KEY not set, forecasts will fail");
    }

    let disease_rag_url = std::env::var("PESTICIDE_RAG_URL")
        .unwrap_or_else(|_| "http://localhost:8001/ask".to_string());
    let price_rag_url =
        std::env::var("PRICE_RAG_URL").unwrap_or_else(|_| "http://localhost:8002/ask".to_string());

    let config = AssistantConfig::default();

    eprintln!("🌾 Krishi Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   WhatsApp webhook: http://0.0.0.0:{}/webhook/whatsapp", port);
    eprintln!("   Voice webhook: http://0.0.0.0:{}/webhook/voice", port);
    eprintln!("   App API: http://0.0.0.0:{}/api", port);

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    // ── Database ────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", db_path);

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm_config = LlmConfig {
        backend: LlmBackend::Gemini,
        api_key: SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config, client.clone())?;

    // ── Translation and geocoding ───────────────────────────────────────
    let translator = Arc::new(TranslationGateway::new(Arc::new(GoogleTranslateApi::new(
        client.clone(),
    ))));
    let geocoder = Arc::new(NominatimGeocoder::new(client.clone()));

    // ── Tools ───────────────────────────────────────────────────────────
    let disease_rag = Arc::new(HttpRagEngine::new(client.clone(), disease_rag_url));
    let price_rag = Arc::new(HttpRagEngine::new(client.clone(), price_rag_url));

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(WeatherForecastTool::new(
            client.clone(),
            SecretString::from(weather_api_key),
            config.forecast_days,
        )),
        Arc::new(DiseaseLookupTool::new(disease_rag)),
        Arc::new(MarketPriceTool::new(price_rag, llm.clone())),
    ];
    eprintln!("   Tools: {} registered", tools.len());

    // ── Agent and engine ────────────────────────────────────────────────
    let dispatcher: Arc<dyn QueryDispatcher> = Arc::new(ToolCallingAgent::new(
        llm.clone(),
        tools,
        config.max_tool_iterations,
    ));
    let classifier = Arc::new(LlmClassifier::new(llm.clone()));
    let onboarding = OnboardingManager::new(classifier, geocoder, dispatcher.clone());
    let assistant = Arc::new(Assistant::new(
        config,
        db.clone(),
        translator.clone(),
        onboarding,
    ));

    let app_ctx = AppContext {
        db,
        translator,
        dispatcher,
        guardrail: Arc::new(ConfidenceGuardrail::new(llm)),
    };

    // ── HTTP server ─────────────────────────────────────────────────────
    let router = whatsapp::router(assistant.clone())
        .merge(voice::router(assistant))
        .merge(app::router(app_ctx))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Server started");
    axum::serve(listener, router).await?;

    Ok(())
}
