use clap::{Args, Parser, Subcommand};
use k8s_openapi::serde_json;
use kube::api::DynamicObject;
use kubemirror::k8s::cache::{
    AggregatorConfig, ChangeAggregator, KubeCollectionConfig, MirrorConfig, WatchSession,
};
use kubemirror::k8s::collection::Scope;
use kubemirror::k8s::definition::ResourceDefinition;
use kubemirror::k8s::kube_collection::CollectionFactory;
use kubemirror::k8s::realize::realize_state;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// User agent sent to the API server (`KUBEMIRROR_USER_AGENT` takes precedence)
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Fail instead of dropping the header when the user agent is invalid
    #[arg(long, global = true)]
    strict_user_agent: bool,
}

/// How to build the API client
struct ClientOptions {
    user_agent: Option<String>,
    strict: bool,
}

impl ClientOptions {
    async fn factory(&self, config: KubeCollectionConfig) -> anyhow::Result<CollectionFactory> {
        Ok(CollectionFactory::infer(config, self.user_agent.as_deref(), self.strict).await?)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror a collection and log every debounced change
    Watch {
        #[command(flatten)]
        target: Target,

        /// Quiet period before a change is reported
        #[arg(long, default_value_t = 1000)]
        debounce_ms: u64,

        /// Wait between a watch failure and the next list
        #[arg(long, default_value_t = 10)]
        backoff_secs: u64,
    },
    /// Converge a collection to the objects in a JSON file
    Realize {
        #[command(flatten)]
        target: Target,

        /// JSON array of objects making up the desired state
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// API group of the collection, empty for the core group
    #[arg(long, default_value = "")]
    group: String,

    /// API version of the collection
    #[arg(long, default_value = "v1")]
    version: String,

    /// Kind of the objects
    #[arg(long)]
    kind: String,

    /// Plural name of the collection
    #[arg(long)]
    plural: String,

    /// Namespace to restrict to
    #[arg(short, long)]
    namespace: Option<String>,

    /// Label selector to restrict to
    #[arg(short = 'l', long)]
    selector: Option<String>,

    /// The collection is cluster-scoped
    #[arg(long)]
    cluster_scoped: bool,
}

impl Target {
    fn definition(&self) -> ResourceDefinition {
        let definition = ResourceDefinition::new(&self.group, &self.version, &self.kind, &self.plural);
        if self.cluster_scoped {
            definition.cluster_scoped()
        } else {
            definition
        }
    }

    fn scope(&self) -> Scope {
        Scope {
            namespace: self.namespace.clone(),
            label_selector: self.selector.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let mut config = MirrorConfig::default();
    let client = ClientOptions {
        user_agent: cli.user_agent,
        strict: cli.strict_user_agent,
    };

    match cli.command {
        Command::Watch {
            target,
            debounce_ms,
            backoff_secs,
        } => {
            config.watch.reconnect_backoff = Duration::from_secs(backoff_secs);
            config.aggregator = AggregatorConfig {
                debounce: Duration::from_millis(debounce_ms),
            };
            watch(&client, &target, config).await
        }
        Command::Realize { target, file } => realize(&client, &target, &file, config).await,
    }
}

async fn watch(client: &ClientOptions, target: &Target, config: MirrorConfig) -> anyhow::Result<()> {
    let factory = client.factory(config.collection.clone()).await?;
    let collection = factory.collection(&target.definition());

    let session = WatchSession::new(collection, target.scope(), config.watch).start();
    let cache = session.cache();
    let aggregator = ChangeAggregator::for_sessions(&[&session], config.aggregator, move || {
        let cache = cache.clone();
        async move {
            let objects = cache.snapshot()?;
            info!("🔄 Mirror changed: {} objects", objects.len());
            for object in &objects {
                info!(
                    "   {}/{} @ {}",
                    object.metadata.namespace.as_deref().unwrap_or("-"),
                    object.metadata.name.as_deref().unwrap_or("-"),
                    object.metadata.resource_version.as_deref().unwrap_or("-")
                );
            }
            Ok::<(), kubemirror::error::Error>(())
        }
    })
    .await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    aggregator.shutdown().await;
    session.shutdown().await?;
    Ok(())
}

async fn realize(
    client: &ClientOptions,
    target: &Target,
    file: &Path,
    config: MirrorConfig,
) -> anyhow::Result<()> {
    let desired: Vec<DynamicObject> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    let factory = client.factory(config.collection).await?;
    let collection = factory.collection(&target.definition());

    let report = realize_state(collection.as_ref(), &desired, &target.scope()).await?;
    println!(
        "created: {}, updated: {}, deleted: {}, unchanged: {}",
        report.created.len(),
        report.updated.len(),
        report.deleted.len(),
        report.unchanged.len()
    );
    for key in &report.created {
        println!("  + {key}");
    }
    for key in &report.updated {
        println!("  ~ {key}");
    }
    for key in &report.deleted {
        println!("  - {key}");
    }
    Ok(())
}
