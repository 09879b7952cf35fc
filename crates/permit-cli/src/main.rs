//! permit command-line interface.
//!
//! Creates users with client certificates and manages what they may do on
//! a Kubernetes cluster.
//!
//! # Quick Start
//!
//! ```bash
//! # Install the built-in access templates once per cluster
//! permit templates install
//!
//! # Create a developer with access to two namespaces
//! permit user provision alice --template developer --namespaces dev,staging -o alice.kubeconfig
//!
//! # Grant an existing ClusterRole in one namespace
//! permit grant alice --cluster-role view -n monitoring
//! ```

mod commands;
mod logging;
mod style;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use permit::{ClusterAccess, ConfigLoader, LogFormat, NamespaceTemplate, PermitConfig};

/// permit - identity and permission orchestration for Kubernetes.
#[derive(Parser)]
#[command(name = "permit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding config.toml (defaults to the XDG config directory).
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// kubeconfig context to connect with.
    #[arg(long, global = true)]
    context: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Manage users.
    #[command(subcommand)]
    User(UserCommands),

    /// Manage Roles and ClusterRoles.
    #[command(subcommand)]
    Role(RoleCommands),

    /// Grant a role to a user.
    Grant(GrantArgs),

    /// Revoke a role from a user.
    Revoke(GrantArgs),

    /// List bindings, flagging those whose role no longer exists.
    Bindings {
        /// Only bindings naming this user.
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List the cluster's namespaces.
    Namespaces,

    /// Manage the built-in access templates.
    #[command(subcommand)]
    Templates(TemplateCommands),

    /// List the users allowed to perform an action.
    WhoCan {
        /// Verb, e.g. get, create, delete.
        verb: String,

        /// Resource, e.g. pods, deployments, pods/log.
        resource: String,

        /// API group of the resource (empty for the core group).
        #[arg(short, long, default_value = "")]
        group: String,

        /// Name of one object.
        #[arg(long)]
        name: Option<String>,

        /// Namespace of the action (cluster scope when absent).
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum UserCommands {
    /// Issue a client certificate for a new user and write its kubeconfig.
    Create {
        /// User name (certificate common name).
        name: String,

        /// Write the kubeconfig here instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Default namespace of the kubeconfig context.
        #[arg(short, long)]
        namespace: Option<String>,

        /// Seconds to wait for approval and signing.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Create a user and grant an access template.
    #[command(group(ArgGroup::new("scope").required(true).args(["namespaces", "all_namespaces"])))]
    Provision {
        /// User name (certificate common name).
        name: String,

        /// Template granted in each selected namespace.
        #[arg(short, long, value_parser = parse_template)]
        template: NamespaceTemplate,

        /// Comma-separated namespaces to grant the template in.
        #[arg(long, value_delimiter = ',')]
        namespaces: Vec<String>,

        /// Grant the template in every namespace.
        #[arg(long)]
        all_namespaces: bool,

        /// Access to cluster-scoped resources: none, read or write.
        #[arg(long, default_value = "none", value_parser = parse_cluster_access)]
        cluster_access: ClusterAccess,

        /// Write the kubeconfig here instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Remove a user from every binding.
    Delete {
        /// User name.
        name: String,
    },

    /// List users and how many bindings name them.
    List,
}

#[derive(Subcommand)]
enum RoleCommands {
    /// Create a Role (with --namespace) or ClusterRole.
    Create {
        /// Role name.
        name: String,

        /// Namespace of the Role; a ClusterRole when absent.
        #[arg(short, long)]
        namespace: Option<String>,

        /// Rule as GROUPS:RESOURCES:VERBS[:NAMES], lists comma-separated,
        /// e.g. `apps:deployments:get,list` or `:pods:*`. Repeatable.
        #[arg(short, long = "rule", required = true, value_parser = commands::role::parse_rule)]
        rules: Vec<permit::PolicyRule>,
    },

    /// Delete a Role (with --namespace) or ClusterRole.
    Delete {
        /// Role name.
        name: String,

        /// Namespace of the Role; a ClusterRole when absent.
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// List roles.
    List {
        /// Only Roles in this namespace.
        #[arg(short, long, conflicts_with = "cluster")]
        namespace: Option<String>,

        /// Only ClusterRoles.
        #[arg(long)]
        cluster: bool,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Create the built-in template ClusterRoles that are missing.
    Install,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration.
    Show {
        /// Output format: toml or json.
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["role", "cluster_role"])))]
struct GrantArgs {
    /// User name.
    user: String,

    /// Namespaced Role (requires --namespace).
    #[arg(long, requires = "namespace")]
    role: Option<String>,

    /// ClusterRole.
    #[arg(long)]
    cluster_role: Option<String>,

    /// Namespace of the binding; a ClusterRoleBinding when absent.
    #[arg(short, long)]
    namespace: Option<String>,
}

fn parse_template(s: &str) -> Result<NamespaceTemplate, String> {
    s.parse()
}

fn parse_cluster_access(s: &str) -> Result<ClusterAccess, String> {
    s.parse()
}

fn load_config(cli: &Cli) -> Result<PermitConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(dir) = &cli.config_dir {
        loader = loader.with_config_dir(dir);
    }
    let mut config = loader.load().context("failed to load configuration")?;

    if let Some(context) = &cli.context {
        config.cluster.context = Some(context.clone());
    }
    if let Some(format) = cli.log_format {
        config.logging.format = match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        };
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color);
    if matches!(cli.command, Commands::Version) {
        commands::version::run();
        return Ok(());
    }

    let config = load_config(&cli)?;
    logging::init(&config.logging)?;
    let session = commands::Session::new(config);

    match cli.command {
        Commands::Version => Ok(()),
        Commands::User(cmd) => match cmd {
            UserCommands::Create {
                name,
                output,
                namespace,
                timeout,
            } => {
                commands::user::create(
                    &session,
                    &name,
                    output.as_deref(),
                    namespace.as_deref(),
                    timeout,
                )
                .await
            }
            UserCommands::Provision {
                name,
                template,
                namespaces,
                all_namespaces,
                cluster_access,
                output,
            } => {
                let selection = if all_namespaces {
                    permit::NamespaceSelection::All
                } else {
                    permit::NamespaceSelection::Only(namespaces)
                };
                let plan = permit::AccessPlan::new(template, selection)
                    .with_cluster_access(cluster_access);
                commands::user::provision(&session, &name, &plan, output.as_deref()).await
            }
            UserCommands::Delete { name } => commands::user::delete(&session, &name).await,
            UserCommands::List => commands::user::list(&session).await,
        },
        Commands::Role(cmd) => match cmd {
            RoleCommands::Create {
                name,
                namespace,
                rules,
            } => commands::role::create(&session, &name, namespace, rules).await,
            RoleCommands::Delete { name, namespace } => {
                commands::role::delete(&session, &name, namespace).await
            }
            RoleCommands::List { namespace, cluster } => {
                commands::role::list(&session, namespace, cluster).await
            }
        },
        Commands::Grant(args) => {
            let (role, scope) =
                commands::grant::target(args.role, args.cluster_role, args.namespace)?;
            commands::grant::grant(&session, &args.user, &role, &scope).await
        }
        Commands::Revoke(args) => {
            let (role, scope) =
                commands::grant::target(args.role, args.cluster_role, args.namespace)?;
            commands::grant::revoke(&session, &args.user, &role, &scope).await
        }
        Commands::Bindings { user } => commands::grant::bindings(&session, user.as_deref()).await,
        Commands::Namespaces => commands::cluster::namespaces(&session).await,
        Commands::Templates(TemplateCommands::Install) => {
            commands::cluster::install_templates(&session).await
        }
        Commands::WhoCan {
            verb,
            resource,
            group,
            name,
            namespace,
        } => {
            commands::cluster::who_can(&session, &verb, &group, &resource, name, namespace).await
        }
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config::show(session.config(), &format)
        }
    }
}
