//! Build manifest discovery and job preparation.

use serde::Serialize;

use super::{PayloadHead, PayloadRepository};
use crate::error::Result;
use crate::providers::ProviderClient;

/// Single-manifest location, checked first.
pub const MANIFEST_FILE: &str = ".build.yml";

/// Directory holding one manifest per `*.yml` file.
pub const MANIFEST_DIR: &str = ".builds";

/// Tag marking jobs submitted for pull requests.
pub const PULL_REQUEST_TAG: &str = "pull_request";

/// A manifest file read from the head repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub contents: String,
}

/// Job submission body for `POST /api/jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub manifest: String,
    pub note: String,
    pub tags: Vec<String>,
    pub execute: bool,
}

/// Reads the manifests of `full_name` at `git_ref`.
///
/// `.build.yml` wins over `.builds/`; directory entries are returned in
/// name order.
pub async fn load_manifests(
    provider: &dyn ProviderClient,
    full_name: &str,
    git_ref: &str,
) -> Result<Vec<Manifest>> {
    if let Some(contents) = provider
        .get_file_contents(full_name, MANIFEST_FILE, git_ref)
        .await?
    {
        return Ok(vec![Manifest {
            name: MANIFEST_FILE.to_string(),
            contents,
        }]);
    }

    let mut names: Vec<String> = provider
        .list_directory(full_name, MANIFEST_DIR, git_ref)
        .await?
        .into_iter()
        .filter(|name| name.ends_with(".yml"))
        .collect();
    names.sort();

    let mut manifests = Vec::with_capacity(names.len());
    for name in names {
        let path = format!("{}/{}", MANIFEST_DIR, name);
        match provider.get_file_contents(full_name, &path, git_ref).await? {
            Some(contents) => manifests.push(Manifest { name: path, contents }),
            None => tracing::warn!("Manifest {} vanished from {}@{}", path, full_name, git_ref),
        }
    }

    Ok(manifests)
}

/// Points every `sources` entry for the base repository at the PR head.
///
/// Entries are compared ignoring a trailing `.git`, a trailing slash, case
/// and any `#ref` fragment. Other entries are left alone.
pub fn rewrite_sources(
    contents: &str,
    base_clone_url: &str,
    head_clone_url: &str,
    sha: &str,
) -> Result<String> {
    let mut manifest: serde_yaml::Value = serde_yaml::from_str(contents)?;

    if let Some(sources) = manifest
        .get_mut("sources")
        .and_then(serde_yaml::Value::as_sequence_mut)
    {
        let replacement = format!("{}#{}", head_clone_url, sha);
        for source in sources.iter_mut() {
            let matches = source
                .as_str()
                .is_some_and(|url| same_repository(url, base_clone_url));
            if matches {
                *source = serde_yaml::Value::String(replacement.clone());
            }
        }
    }

    Ok(serde_yaml::to_string(&manifest)?)
}

/// Replaces characters the builds service rejects in tags.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Turns manifests into job requests for `head` proposed against `base`.
///
/// Manifests that are not valid YAML are skipped.
pub fn prepare_jobs(
    manifests: &[Manifest],
    base: &PayloadRepository,
    head: &PayloadHead,
    head_repository: &PayloadRepository,
) -> Vec<JobRequest> {
    let note = format!(
        "Pull request {} ({}) on {}",
        head.display_name(),
        head.short_sha(),
        base.full_name
    );
    let tags = vec![sanitize_tag(&base.name), PULL_REQUEST_TAG.to_string()];

    manifests
        .iter()
        .filter_map(|manifest| {
            match rewrite_sources(
                &manifest.contents,
                &base.clone_url,
                &head_repository.clone_url,
                &head.sha,
            ) {
                Ok(rewritten) => Some(JobRequest {
                    manifest: rewritten,
                    note: note.clone(),
                    tags: tags.clone(),
                    execute: true,
                }),
                Err(e) => {
                    tracing::warn!("Skipping manifest {}: {}", manifest.name, e);
                    None
                }
            }
        })
        .collect()
}

fn same_repository(a: &str, b: &str) -> bool {
    fn normalize(url: &str) -> String {
        let url = url.split('#').next().unwrap_or(url).trim_end_matches('/');
        url.strip_suffix(".git").unwrap_or(url).to_ascii_lowercase()
    }

    normalize(a) == normalize(b)
}
