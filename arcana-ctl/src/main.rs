use anyhow::{anyhow, Context};
use arcana_api::{AuthToken, Sweep, Uuid};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Drop follower and following entries pointing at deleted users
    CleanupFollowers,

    /// Drop activities pointing at deleted collections
    CleanupCollectionActivity,

    /// Drop comment and reply activities whose comment is missing
    CleanOrphanCommentsActivity,

    /// Drop collections whose owner is gone
    CleanupOrphanCollections,

    /// Run every sweep, in order
    All,
}

impl Command {
    fn sweeps(&self) -> Vec<Sweep> {
        match self {
            Command::CleanupFollowers => vec![Sweep::Followers],
            Command::CleanupCollectionActivity => vec![Sweep::CollectionActivity],
            Command::CleanOrphanCommentsActivity => vec![Sweep::CommentActivity],
            Command::CleanupOrphanCollections => vec![Sweep::OrphanCollections],
            Command::All => Sweep::ALL.to_vec(),
        }
    }
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();
    let token = admin_token()?;

    let client = reqwest::Client::new();

    for sweep in opt.cmd.sweeps() {
        let resp = client
            .post(format!("{}{}", opt.host.trim_end_matches('/'), sweep.path()))
            .bearer_auth(token.0)
            .send()
            .await
            .with_context(|| format!("sending request for sweep {sweep}"))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading response of sweep {sweep}"))?;
        if !status.is_success() {
            let err = arcana_api::Error::parse(&body)
                .map(|e| anyhow!(e))
                .unwrap_or_else(|_| anyhow!("server answered {status}"));
            return Err(err.context(format!("running sweep {sweep}")));
        }
        let report: serde_json::Value =
            serde_json::from_slice(&body).context("parsing sweep report")?;
        println!("{sweep}: {report}");
    }

    Ok(())
}
