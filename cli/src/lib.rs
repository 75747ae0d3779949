use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dotroute_core::dispatch::{DispatchError, DotRouter};
use dotroute_core::provider::from_addr;
use dotroute_core::tree::{store_dots, DotTree, LoadError, RouteError};
use dotroute_core::{Dot, QueryParams};
use tracing::{info, instrument};

pub mod args;

pub use args::{Args, Command};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to read seed {path}: {source}")]
    SeedRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid seed {path}: {source}")]
    SeedFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("backing store: {0}")]
    Provider(#[from] dotroute_core::Error),

    #[error("unable to load dots: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("unable to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Parses a `name=value` request parameter. The value may be empty.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {:?}", s)),
    }
}

/// Groups parameters by name, keeping the order of repeated values.
pub fn collect_params(pairs: impl IntoIterator<Item = (String, String)>) -> QueryParams {
    let mut params = QueryParams::new();
    for (name, value) in pairs {
        params.entry(name).or_default().push(value);
    }
    params
}

/// The route a request for `target` enters at when none is given: the
/// target's first segment.
pub fn default_entry(target: &str) -> String {
    let first = target
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    format!("/{}", first)
}

pub fn load_seed(path: &Path) -> Result<Vec<Dot>, Error> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::SeedRead {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| Error::SeedFormat {
        path: path.to_owned(),
        source,
    })
}

/// Connects to the backing store, loads the tree and runs the command,
/// writing its output to `out`.
#[instrument(skip_all, fields(provider_addr = %args.provider_addr))]
pub async fn run(args: &Args, out: &mut impl Write) -> Result<(), Error> {
    let pool = Arc::new(from_addr(&args.provider_addr).await?);
    let loader_config = args.loader_config();

    if let Some(seed) = &args.seed {
        let dots = load_seed(seed)?;
        store_dots(&pool, &loader_config, &dots).await?;
        info!(dots = dots.len(), seed = %seed.display(), "seeded dots table");
    }

    let mut tree = DotTree::load(pool.clone(), &loader_config).await?;

    match &args.command {
        Command::Dump => {
            tree.generate_routes()?;
            writeln!(out, "{}", tree.to_json()?)?;
        }
        Command::Routes => {
            tree.generate_routes()?;
            for (route, dot) in tree.routes() {
                writeln!(out, "{}\t{}\t{}", route, dot.depth(), dot.children())?;
            }
        }
        Command::Request {
            target,
            entry,
            params,
        } => {
            let entry = entry.clone().unwrap_or_else(|| default_entry(target));
            let router = DotRouter::start(tree, pool, args.dispatch_config())?;

            let outcome = router
                .request(collect_params(params.iter().cloned()), &entry, target)
                .await;
            router.shutdown().await;

            writeln!(out, "{}", outcome?.to_json())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use rstest::rstest;

    use super::{collect_params, default_entry, parse_param, run, Args, Error};

    const SEED: &str = r#"[
        {"Id": 0, "ParentId": 0, "Name": "root"},
        {"Id": 1, "ParentId": 0, "Name": "people",
         "Value": "{\"dot\": {\"construct\": {\"table\": \"people\", \"ds\": \"app\", \"d\": [{\"name\": \"name\", \"type\": \"text\"}]}}}"},
        {"Id": 2, "ParentId": 1, "Name": "add",
         "Value": "{\"dot\": {\"query\": {\"q\": [{\"name\": \"name\", \"type\": \"required\", \"cdest\": {\"table\": \"people\", \"ds\": \"app\"}}]}}}"}
    ]"#;

    fn seed_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(SEED.as_bytes()).expect("write seed");
        file
    }

    async fn run_with(seed: &tempfile::NamedTempFile, args: &[&str]) -> Result<String, Error> {
        let seed_path = seed.path().to_str().expect("utf-8 path").to_string();
        let args = Args::try_parse_from(
            ["dotroute", "--seed", seed_path.as_str()]
                .into_iter()
                .chain(args.iter().copied()),
        )
        .expect("parse");

        let mut out = Vec::new();
        run(&args, &mut out).await?;
        Ok(String::from_utf8(out).expect("utf-8 output"))
    }

    #[rstest]
    #[case::simple("a=1", Ok(("a", "1")))]
    #[case::empty_value("a=", Ok(("a", "")))]
    #[case::value_with_equals("a=b=c", Ok(("a", "b=c")))]
    #[case::no_equals("a", Err(()))]
    #[case::no_name("=1", Err(()))]
    fn params(#[case] input: &str, #[case] expected: Result<(&str, &str), ()>) {
        assert_eq!(
            expected.map(|(k, v)| (k.to_string(), v.to_string())),
            parse_param(input).map_err(|_| ())
        );
    }

    #[test]
    fn repeated_params_keep_order() {
        let params = collect_params([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "x".to_string()),
            ("a".to_string(), "2".to_string()),
        ]);
        assert_eq!(Some(&vec!["1".to_string(), "2".to_string()]), params.get("a"));
    }

    #[rstest]
    #[case::nested("/a/b/c", "/a")]
    #[case::single("/a", "/a")]
    #[case::no_leading_slash("a/b", "/a")]
    fn entries(#[case] target: &str, #[case] expected: &str) {
        assert_eq!(expected, default_entry(target));
    }

    #[tokio::test]
    async fn routes() {
        let seed = seed_file();
        assert_eq!(
            "/people\t1\t1\n/people/add\t2\t0\n",
            run_with(&seed, &["routes"]).await.expect("run")
        );
    }

    #[tokio::test]
    async fn dump() {
        let seed = seed_file();
        let out = run_with(&seed, &["dump"]).await.expect("run");

        let dump: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(3, dump.as_array().map(Vec::len).unwrap_or_default());
        assert_eq!("/people/add", dump[2]["DotRoute"]);
    }

    #[tokio::test]
    async fn request() {
        let seed = seed_file();

        assert_eq!(
            "{\"complete\":\"/people/add\"}\n",
            run_with(&seed, &["request", "/people/add", "-p", "name=alice"])
                .await
                .expect("run")
        );

        let failed = run_with(&seed, &["request", "/people/add", "--entry", "/people/add"])
            .await
            .expect("run");
        assert!(failed.starts_with(r#"{"id":2,"errors":[{"kind":"validation""#));
    }

    #[tokio::test]
    async fn bad_seed() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"not json").expect("write");

        assert!(matches!(
            run_with(&file, &["routes"]).await,
            Err(Error::SeedFormat { .. })
        ));
    }
}
