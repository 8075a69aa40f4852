use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;

use crate::registry::api::{Body, ResponseExt, OCI_FILTERS_APPLIED, ORAS_API_VERSION};
use crate::registry::manifest::MEDIA_TYPE_OCI_INDEX;
use crate::registry::oci::{Descriptor, Digest};
use crate::registry::referrers::{
    self, decode_next_token, paginate_referrers, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use crate::registry::{Error, Registry};

const ANNOTATION_REFERRERS_FILTERS_APPLIED: &str =
    "org.opencontainers.image.annotations.referrers.filtersApplied";

/// OCI 1.1 referrers response: an image index whose manifests are the
/// referrer descriptors.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerList {
    pub schema_version: i32,
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl Default for ReferrerList {
    fn default() -> Self {
        ReferrerList {
            schema_version: 2,
            media_type: MEDIA_TYPE_OCI_INDEX.to_string(),
            manifests: Vec::new(),
            annotations: HashMap::new(),
        }
    }
}

/// ORAS referrers response body.
#[derive(Serialize, Debug)]
pub struct OrasReferrersResponse {
    pub referrers: Vec<Descriptor>,
}

/// Query parameters of the ORAS referrers route. `n` stays a string so an
/// unparsable value falls back to the default page size instead of
/// failing the request.
#[derive(Debug, Default)]
pub struct OrasReferrersQuery {
    pub artifact_type: Option<String>,
    pub n: Option<String>,
    pub next_token: Option<String>,
}

pub(crate) fn paginate<T>(items: &[T], n: usize, last: Option<&str>) -> (Vec<T>, Option<String>)
where
    T: Clone + ToString,
{
    let start = match last {
        Some(last) => items
            .iter()
            .position(|item| item.to_string() == last)
            .map_or(0, |pos| pos + 1),
        None => 0,
    };

    let end = (start + n).min(items.len());
    let page = items[start..end].to_vec();

    let next = if !page.is_empty() && end < items.len() {
        Some(page[page.len() - 1].to_string())
    } else {
        None
    };

    (page, next)
}

impl Registry {
    pub async fn referrers(
        &self,
        name: &str,
        subject: &Digest,
        artifact_type: Option<&str>,
    ) -> Result<Vec<Descriptor>, Error> {
        let repo = self.repository(name)?;
        referrers::referrers_for_subject(
            self.driver(),
            &repo.manifests(),
            name,
            subject,
            artifact_type,
        )
        .await
    }

    /// `GET /v2/<name>/referrers/<digest>`: the OCI 1.1 representation,
    /// an image index annotated when a filter was applied. Unpaginated.
    #[instrument(skip(self))]
    pub async fn handle_get_referrers(
        &self,
        name: &str,
        subject: &Digest,
        artifact_type: Option<&str>,
    ) -> Result<Response<Body>, Error> {
        let manifests = self.referrers(name, subject, artifact_type).await?;

        let mut referrer_list = ReferrerList {
            manifests,
            ..ReferrerList::default()
        };
        if artifact_type.is_some() {
            referrer_list.annotations.insert(
                ANNOTATION_REFERRERS_FILTERS_APPLIED.to_string(),
                "artifactType".to_string(),
            );
        }
        let body = serde_json::to_vec(&referrer_list)?;

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, MEDIA_TYPE_OCI_INDEX);
        if artifact_type.is_some() {
            builder = builder.header(OCI_FILTERS_APPLIED, "artifactType");
        }

        Ok(builder.body(Body::fixed(body))?)
    }

    /// `GET /oras/artifacts/v1/<name>/manifests/<digest>/referrers`: the
    /// ORAS representation, paginated with a multi-digest continuation
    /// token and a `Link` header while more results remain.
    #[instrument(skip(self, query))]
    pub async fn handle_oras_referrers(
        &self,
        name: &str,
        subject: &Digest,
        query: &OrasReferrersQuery,
    ) -> Result<Response<Body>, Error> {
        let requested_n = query.n.as_deref().and_then(|n| n.parse::<usize>().ok());
        let page_size = match requested_n {
            Some(n) if (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&n) => n,
            _ => MAX_PAGE_SIZE,
        };

        let token_digests = match query.next_token.as_deref() {
            Some(token) if !token.is_empty() => decode_next_token(token)?,
            _ => Vec::new(),
        };

        let artifact_type = query.artifact_type.as_deref();
        let all = self.referrers(name, subject, artifact_type).await?;
        let page = paginate_referrers(all, page_size, &token_digests)?;

        let link = page.next_token.as_ref().map(|token| {
            let mut url =
                format!("/oras/artifacts/v1/{name}/manifests/{subject}/referrers?nextToken={token}");
            if let Some(artifact_type) = artifact_type {
                url = format!("{url}&artifactType={artifact_type}");
            }
            if requested_n.is_some() {
                url = format!("{url}&n={page_size}");
            }
            url
        });

        let body = serde_json::to_vec(&OrasReferrersResponse {
            referrers: page.items,
        })?;

        let mut response = Response::paginated(Body::fixed(body), "application/json", link.as_deref())?;
        response
            .headers_mut()
            .insert(ORAS_API_VERSION, "oras/1.0".parse().unwrap());
        Ok(response)
    }

    pub async fn list_catalog(
        &self,
        n: Option<usize>,
        last: Option<String>,
    ) -> Result<(Vec<String>, Option<String>), Error> {
        let n = n.unwrap_or(100);
        let repositories = self.enumerate_repositories().await?;

        let (page, next) = paginate(&repositories, n, last.as_deref());
        let link = next.map(|next| format!("/v2/_catalog?n={n}&last={next}"));
        Ok((page, link))
    }

    pub async fn list_tags(
        &self,
        name: &str,
        n: Option<usize>,
        last: Option<String>,
    ) -> Result<(Vec<String>, Option<String>), Error> {
        let n = n.unwrap_or(100);
        let repo = self.repository(name)?;
        let tags = repo.tags().all().await?;

        let (page, next) = paginate(&tags, n, last.as_deref());
        let link = next.map(|next| format!("/v2/{name}/tags/list?n={n}&last={next}"));
        Ok((page, link))
    }

    pub async fn handle_list_catalog(
        &self,
        n: Option<usize>,
        last: Option<String>,
    ) -> Result<Response<Body>, Error> {
        #[derive(Serialize)]
        struct CatalogResponse {
            repositories: Vec<String>,
        }

        let (repositories, link) = self.list_catalog(n, last).await?;
        let body = serde_json::to_vec(&CatalogResponse { repositories })?;
        Response::paginated(Body::fixed(body), "application/json", link.as_deref())
    }

    pub async fn handle_list_tags(
        &self,
        name: &str,
        n: Option<usize>,
        last: Option<String>,
    ) -> Result<Response<Body>, Error> {
        #[derive(Serialize)]
        struct TagsResponse {
            name: String,
            tags: Vec<String>,
        }

        let (tags, link) = self.list_tags(name, n, last).await?;
        let body = serde_json::to_vec(&TagsResponse {
            name: name.to_string(),
            tags,
        })?;
        Response::paginated(Body::fixed(body), "application/json", link.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest::{MEDIA_TYPE_ORAS_ARTIFACT, MEDIA_TYPE_SCHEMA2_MANIFEST};
    use crate::registry::oci::Reference;
    use http_body_util::BodyExt;
    use hyper::header::LINK;
    use serde_json::json;
    use tempfile::TempDir;

    async fn read_body(response: Response<Body>) -> serde_json::Value {
        let collected = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&collected).unwrap()
    }

    async fn push_subject(registry: &Registry, name: &str) -> Digest {
        let repo = registry.repository(name).unwrap();
        let blobs = repo.blobs();
        let config = blobs
            .put("application/octet-stream", b"subject config")
            .await
            .unwrap();

        let content = serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_SCHEMA2_MANIFEST,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": config.digest.to_string(),
                "size": config.size
            },
            "layers": []
        }))
        .unwrap();

        registry
            .put_manifest(name, &Reference::Tag("latest".to_string()), None, &content)
            .await
            .unwrap()
            .digest
    }

    async fn push_artifact(
        registry: &Registry,
        name: &str,
        subject: &Digest,
        artifact_type: &str,
        created: Option<&str>,
        seed: &str,
    ) -> Digest {
        let repo = registry.repository(name).unwrap();
        let blob = repo
            .blobs()
            .put("application/octet-stream", format!("{seed} blob").as_bytes())
            .await
            .unwrap();

        let mut value = json!({
            "mediaType": MEDIA_TYPE_ORAS_ARTIFACT,
            "artifactType": artifact_type,
            "blobs": [{
                "mediaType": blob.media_type,
                "digest": blob.digest.to_string(),
                "size": blob.size
            }],
            "subject": {
                "mediaType": MEDIA_TYPE_SCHEMA2_MANIFEST,
                "digest": subject.to_string(),
                "size": 123
            }
        });
        if let Some(created) = created {
            value["annotations"] = json!({ "io.cncf.oras.artifact.created": created });
        }
        let content = serde_json::to_vec(&value).unwrap();
        let computed = Digest::from_bytes(&content);

        registry
            .put_manifest(name, &Reference::Digest(computed), None, &content)
            .await
            .unwrap()
            .digest
    }

    #[test]
    fn test_paginate_helper() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let (page, next) = paginate(&items, 2, None);
        assert_eq!(page, vec!["a", "b"]);
        assert_eq!(next.as_deref(), Some("b"));

        let (page, next) = paginate(&items, 2, Some("b"));
        assert_eq!(page, vec!["c"]);
        assert!(next.is_none());

        let (page, next) = paginate(&items, 10, None);
        assert_eq!(page.len(), 3);
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_artifact_put_and_discover() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();
        let name = "library/app";

        let subject = push_subject(&registry, name).await;
        let artifact = push_artifact(&registry, name, &subject, "app/notary", None, "sig").await;

        let response = registry
            .handle_get_referrers(name, &subject, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.get_header(CONTENT_TYPE),
            Some(MEDIA_TYPE_OCI_INDEX.to_string())
        );

        let body = read_body(response).await;
        let manifests = body["manifests"].as_array().unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(
            manifests[0]["digest"].as_str().unwrap(),
            artifact.to_string()
        );
        assert_eq!(
            manifests[0]["mediaType"].as_str().unwrap(),
            MEDIA_TYPE_ORAS_ARTIFACT
        );
        assert_eq!(manifests[0]["artifactType"].as_str().unwrap(), "app/notary");
        assert!(manifests[0]["size"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_filter_by_artifact_type() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();
        let name = "library/app";

        let subject = push_subject(&registry, name).await;
        let notary = push_artifact(&registry, name, &subject, "app/notary", None, "a").await;
        let _sbom = push_artifact(&registry, name, &subject, "app/sbom", None, "b").await;

        let response = registry
            .handle_get_referrers(name, &subject, Some("app/notary"))
            .await
            .unwrap();
        assert_eq!(
            response.get_header(OCI_FILTERS_APPLIED),
            Some("artifactType".to_string())
        );

        let body = read_body(response).await;
        assert_eq!(
            body["annotations"][ANNOTATION_REFERRERS_FILTERS_APPLIED]
                .as_str()
                .unwrap(),
            "artifactType"
        );
        let manifests = body["manifests"].as_array().unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0]["digest"].as_str().unwrap(), notary.to_string());

        // Non-matching filter returns an empty index.
        let response = registry
            .handle_get_referrers(name, &subject, Some("app/none"))
            .await
            .unwrap();
        let body = read_body(response).await;
        assert!(body["manifests"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sort_by_created_annotation() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();
        let name = "library/app";

        let subject = push_subject(&registry, name).await;
        let january = push_artifact(
            &registry,
            name,
            &subject,
            "app/x",
            Some("2022-01-01T00:00:00Z"),
            "jan",
        )
        .await;
        let march = push_artifact(
            &registry,
            name,
            &subject,
            "app/x",
            Some("2022-03-01T00:00:00Z"),
            "mar",
        )
        .await;
        let february = push_artifact(
            &registry,
            name,
            &subject,
            "app/x",
            Some("2022-02-01T00:00:00Z"),
            "feb",
        )
        .await;
        let unannotated = push_artifact(&registry, name, &subject, "app/x", None, "none").await;

        let referrers = registry.referrers(name, &subject, None).await.unwrap();
        let order: Vec<String> = referrers
            .iter()
            .map(|descriptor| descriptor.digest.to_string())
            .collect();

        assert_eq!(
            order,
            vec![
                march.to_string(),
                february.to_string(),
                january.to_string(),
                unannotated.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_oras_pagination_resume() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();
        let name = "library/app";

        let subject = push_subject(&registry, name).await;
        for i in 0..120 {
            push_artifact(&registry, name, &subject, "app/x", None, &format!("s{i}")).await;
        }

        let response = registry
            .handle_oras_referrers(
                name,
                &subject,
                &OrasReferrersQuery {
                    n: Some("50".to_string()),
                    ..OrasReferrersQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            response.get_header(ORAS_API_VERSION),
            Some("oras/1.0".to_string())
        );
        let link1 = response.get_header(LINK).expect("page 1 link");
        let body = read_body(response).await;
        assert_eq!(body["referrers"].as_array().unwrap().len(), 50);

        let token1 = link1
            .split("nextToken=")
            .nth(1)
            .unwrap()
            .split(['&', '>'])
            .next()
            .unwrap()
            .to_string();

        let response = registry
            .handle_oras_referrers(
                name,
                &subject,
                &OrasReferrersQuery {
                    n: Some("50".to_string()),
                    next_token: Some(token1),
                    ..OrasReferrersQuery::default()
                },
            )
            .await
            .unwrap();
        let link2 = response.get_header(LINK).expect("page 2 link");
        let body = read_body(response).await;
        assert_eq!(body["referrers"].as_array().unwrap().len(), 50);

        let token2 = link2
            .split("nextToken=")
            .nth(1)
            .unwrap()
            .split(['&', '>'])
            .next()
            .unwrap()
            .to_string();

        let response = registry
            .handle_oras_referrers(
                name,
                &subject,
                &OrasReferrersQuery {
                    n: Some("50".to_string()),
                    next_token: Some(token2),
                    ..OrasReferrersQuery::default()
                },
            )
            .await
            .unwrap();
        assert!(response.get_header(LINK).is_none());
        let body = read_body(response).await;
        assert_eq!(body["referrers"].as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_oras_page_size_reset() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();
        let name = "library/app";

        let subject = push_subject(&registry, name).await;
        for i in 0..60 {
            push_artifact(&registry, name, &subject, "app/x", None, &format!("r{i}")).await;
        }

        // n below the minimum resets to the maximum page size.
        let response = registry
            .handle_oras_referrers(
                name,
                &subject,
                &OrasReferrersQuery {
                    n: Some("2".to_string()),
                    ..OrasReferrersQuery::default()
                },
            )
            .await
            .unwrap();
        let body = read_body(response).await;
        assert_eq!(body["referrers"].as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_oras_malformed_token() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();
        let name = "library/app";

        let subject = push_subject(&registry, name).await;

        let err = registry
            .handle_oras_referrers(
                name,
                &subject,
                &OrasReferrersQuery {
                    next_token: Some("%%%garbage%%%".to_string()),
                    ..OrasReferrersQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedNextToken(_)));
    }

    #[tokio::test]
    async fn test_referrers_of_unknown_subject_is_empty() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();

        let subject = Digest::from_bytes(b"nothing refers to this");
        let referrers = registry
            .referrers("library/app", &subject, None)
            .await
            .unwrap();
        assert!(referrers.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_and_tags_pagination() {
        let tmp_dir = TempDir::new().unwrap();
        let registry = Registry::for_path(tmp_dir.path()).unwrap();

        for name in ["repo-a", "repo-b", "repo-c"] {
            push_subject(&registry, name).await;
        }

        let (page, link) = registry.list_catalog(Some(2), None).await.unwrap();
        assert_eq!(page, vec!["repo-a", "repo-b"]);
        assert_eq!(link.as_deref(), Some("/v2/_catalog?n=2&last=repo-b"));

        let (page, link) = registry
            .list_catalog(Some(2), Some("repo-b".to_string()))
            .await
            .unwrap();
        assert_eq!(page, vec!["repo-c"]);
        assert!(link.is_none());

        let digest = push_subject(&registry, "tagged").await;
        let repo = registry.repository("tagged").unwrap();
        repo.tags().tag("v1", &digest).await.unwrap();
        repo.tags().tag("v2", &digest).await.unwrap();

        let (tags, link) = registry.list_tags("tagged", Some(2), None).await.unwrap();
        assert_eq!(tags, vec!["latest", "v1"]);
        assert!(link.is_some());
    }
}
