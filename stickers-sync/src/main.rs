use anyhow::Context;
use stickers_core::StickerClient;
use stickers_sync::config::SyncConfig;
use stickers_sync::saved::model::{CollectionRef, ItemId, OperationRecord, ResourceRef, StickerFile};
use stickers_sync::saved::reconciler::SavedItemsReconciler;
use stickers_sync::saved::store::Store;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: stickers-sync <command>
  list                              Show saved stickers, most recent first
  pending                           Show queued operations in commit order
  is-saved <id>                     Check whether a sticker is saved
  add <id> <access_hash> [--pack-id <id> <access_hash> | --pack-name <name>]
                                    Save a sticker
  remove <id>                       Remove a saved sticker
  resync                            Request a full reconciliation";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List,
    Pending,
    IsSaved(i64),
    Add {
        id: i64,
        access_hash: i64,
        collection: Option<CollectionRef>,
    },
    Remove(i64),
    Resync,
    Help,
}

fn parse_i64(value: Option<String>, what: &str) -> anyhow::Result<i64> {
    let value = value.with_context(|| format!("missing {what}"))?;
    value
        .parse()
        .with_context(|| format!("invalid {what}: {value}"))
}

fn parse_command<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(name) = args.next() else {
        return Ok(Command::Help);
    };
    let command = match name.as_str() {
        "list" => Command::List,
        "pending" => Command::Pending,
        "resync" => Command::Resync,
        "--help" | "-h" | "help" => Command::Help,
        "is-saved" => Command::IsSaved(parse_i64(args.next(), "sticker id")?),
        "remove" => Command::Remove(parse_i64(args.next(), "sticker id")?),
        "add" => {
            let id = parse_i64(args.next(), "sticker id")?;
            let access_hash = parse_i64(args.next(), "access hash")?;
            let collection = match args.next().as_deref() {
                None => None,
                Some("--pack-id") => Some(CollectionRef::Id {
                    id: parse_i64(args.next(), "pack id")?,
                    access_hash: parse_i64(args.next(), "pack access hash")?,
                }),
                Some("--pack-name") => Some(CollectionRef::Name {
                    short_name: args.next().context("missing pack name")?,
                }),
                Some(other) => anyhow::bail!("unknown argument: {other}"),
            };
            Command::Add {
                id,
                access_hash,
                collection,
            }
        }
        other => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(command)
}

async fn run(reconciler: &SavedItemsReconciler, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List => {
            for item in reconciler.saved_items().await? {
                println!("{}\t{}", item.identity.id, item.labels.join(" "));
            }
        }
        Command::Pending => {
            for entry in reconciler.pending_operations().await? {
                let record = match entry.record {
                    OperationRecord::Add { file_id, .. } => format!("add {file_id}"),
                    OperationRecord::Remove { file_id, .. } => format!("remove {file_id}"),
                    OperationRecord::Sync => "sync".to_string(),
                };
                println!("{}\t{}\t{record}", entry.local_index, entry.merge_index);
            }
        }
        Command::IsSaved(id) => {
            println!("{}", reconciler.is_saved(ItemId::cloud(id)).await?);
        }
        Command::Add {
            id,
            access_hash,
            collection,
        } => {
            let file = StickerFile {
                id: ItemId::cloud(id),
                resource: ResourceRef::CloudDocument {
                    file_id: id,
                    access_hash,
                    file_reference: None,
                },
                collection,
            };
            let outcome = reconciler.add_saved_item(&file).await?;
            println!("{outcome:?}");
        }
        Command::Remove(id) => {
            let outcome = reconciler.remove_saved_item(ItemId::cloud(id)).await?;
            println!("{outcome:?}");
        }
        Command::Resync => {
            let entry = reconciler.request_resync().await?;
            println!("sync requested at {}", entry.local_index);
        }
        Command::Help => println!("{USAGE}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let command = parse_command(std::env::args())?;
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = SyncConfig::from_env()?;
    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open state database at {:?}", config.db_path))?;
    let client = StickerClient::with_base_url(&config.api_url, config.api_token.clone())?;
    let reconciler = SavedItemsReconciler::new(store, client, config.saved_capacity);
    run(&reconciler, command).await
}
