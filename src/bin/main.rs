use finance_chat_assistant::{
    backend::{MockBackend, MockBackendFactory},
    channel::ScriptedChannel,
    config::AssistantConfig,
    llm::{LlmClient, OpenAiClient},
    models::{Account, AccountFolder, Category, CategoryKind, ChatKind, Currency},
    registry::InMemoryChatRegistry,
    session::{InboundMessage, SessionDeps, SessionEvent, SessionManager},
    transport::RecordingTransport,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Demo run: wires the session machine to in-memory collaborators and plays
/// a short registration + bookkeeping conversation, printing every message
/// the assistant would have shown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AssistantConfig::from_env();
    info!("Finance chat assistant starting");

    let backend = Arc::new(MockBackend::new("demo-user"));
    backend
        .seed(
            vec![
                Account {
                    account_id: 1,
                    folder_id: 1,
                    currency_id: 1,
                    name: "Wallet".to_string(),
                    amount: Decimal::new(25000, 2),
                    hidden: false,
                    description: Some("pocket money".to_string()),
                },
                Account {
                    account_id: 2,
                    folder_id: 1,
                    currency_id: 1,
                    name: "Bank".to_string(),
                    amount: Decimal::new(420000, 2),
                    hidden: false,
                    description: None,
                },
            ],
            vec![AccountFolder {
                folder_id: 1,
                name: "Personal".to_string(),
                description: None,
            }],
            vec![
                Category {
                    category_id: 1,
                    name: "Groceries".to_string(),
                    description: None,
                    kind: CategoryKind::Expense,
                },
                Category {
                    category_id: 2,
                    name: "Salary".to_string(),
                    description: None,
                    kind: CategoryKind::Income,
                },
            ],
            vec![Currency {
                currency_id: 1,
                symbol: "€".to_string(),
                code: "EUR".to_string(),
                decimals: 2,
                owned: false,
            }],
        )
        .await;

    let transport = Arc::new(RecordingTransport::new("finbot"));

    let llm: Option<Arc<dyn LlmClient>> = if config.llm_enabled {
        Some(Arc::new(OpenAiClient::new(
            &config.llm_api_url,
            &config.llm_api_key,
            &config.llm_model,
        )))
    } else {
        None
    };

    let deps = SessionDeps {
        config,
        registry: Arc::new(InMemoryChatRegistry::new()),
        transport: Arc::clone(&transport) as _,
        backend_factory: Arc::new(MockBackendFactory::new(Arc::clone(&backend))),
        channel: Arc::new(ScriptedChannel::unavailable()),
        llm,
    };

    let manager = SessionManager::new(deps);
    let chat_id = 1;

    // registration: server URL, then a session token
    manager
        .dispatch(chat_id, ChatKind::Private, message(1, "demo.finance.example"))
        .await?;
    manager
        .dispatch(chat_id, ChatKind::Private, message(2, "demo-token"))
        .await?;

    // log an expense, then confirm it
    manager
        .dispatch(chat_id, ChatKind::Private, message(3, "12,50 grocery wallet"))
        .await?;
    manager
        .dispatch(
            chat_id,
            ChatKind::Private,
            SessionEvent::Button {
                action: "confirm".to_string(),
            },
        )
        .await?;

    // and a note
    manager
        .dispatch(chat_id, ChatKind::Private, message(4, "! pay rent on friday"))
        .await?;

    println!("\n=== CONVERSATION TRANSCRIPT ===");
    for (i, (_, shown)) in transport.sent().iter().enumerate() {
        println!("\n--- message {} ---", i + 1);
        println!("{}", shown.text);
        for row in &shown.buttons {
            let labels: Vec<&str> = row.iter().map(|b| b.label.as_str()).collect();
            println!("[{}]", labels.join("] ["));
        }
    }

    println!("\ntransactions recorded: {}", backend.transaction_count().await);
    Ok(())
}

fn message(message_id: i64, text: &str) -> SessionEvent {
    SessionEvent::Message(InboundMessage {
        message_id,
        text: text.to_string(),
        reply_to_bot: false,
    })
}
