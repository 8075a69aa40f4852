use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use tracing::{instrument, warn};

use crate::registry::api::{Body, DOCKER_CONTENT_DIGEST, OCI_SUBJECT};
use crate::registry::manifest;
use crate::registry::oci::{Digest, Reference};
use crate::registry::{referrers, Error, Registry};

pub struct GetManifestResponse {
    pub media_type: String,
    pub digest: Digest,
    pub content: Vec<u8>,
}

#[derive(Debug)]
pub struct PutManifestResponse {
    pub digest: Digest,
    pub subject: Option<Digest>,
}

impl Registry {
    #[instrument(skip(self))]
    pub async fn get_manifest(
        &self,
        name: &str,
        reference: &Reference,
    ) -> Result<GetManifestResponse, Error> {
        let repo = self.repository(name)?;

        let digest = match reference {
            Reference::Digest(digest) => digest.clone(),
            Reference::Tag(tag) => repo.tags().resolve(tag).await?,
        };

        let manifest = repo.manifests().get(&digest).await?;
        let (media_type, content) = manifest.payload();

        Ok(GetManifestResponse {
            media_type: media_type.to_string(),
            digest,
            content: content.to_vec(),
        })
    }

    /// Stores a manifest payload. The payload bytes are canonical: the
    /// revision digest is computed over exactly what the client sent.
    #[instrument(skip(self, body))]
    pub async fn put_manifest(
        &self,
        name: &str,
        reference: &Reference,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<PutManifestResponse, Error> {
        let repo = self.repository(name)?;

        let parsed = manifest::from_slice(body)?;
        let (media_type, _) = parsed.payload();

        if let Some(content_type) = content_type {
            if content_type != media_type {
                warn!("Manifest media type mismatch: {content_type} (header) != {media_type} (payload)");
                return Err(Error::ManifestInvalid(
                    "Content-Type does not match manifest media type".to_string(),
                ));
            }
        }

        if let Reference::Digest(provided) = reference {
            let computed = Digest::from_bytes(body);
            if provided != &computed {
                warn!("Provided digest does not match payload: {provided} != {computed}");
                return Err(Error::DigestInvalid);
            }
        }

        let digest = repo.manifests().put(&parsed).await?;

        if let Reference::Tag(tag) = reference {
            repo.tags().tag(tag, &digest).await?;
        }

        Ok(PutManifestResponse {
            digest,
            subject: parsed.subject().map(|subject| subject.digest.clone()),
        })
    }

    /// Deleting by tag unlinks only the tag; deleting by digest removes
    /// the revision, any tags pointing at it, and the referrer edge to
    /// its subject.
    #[instrument(skip(self))]
    pub async fn delete_manifest(&self, name: &str, reference: &Reference) -> Result<(), Error> {
        let repo = self.repository(name)?;

        match reference {
            Reference::Tag(tag) => repo.tags().untag(tag).await,
            Reference::Digest(digest) => {
                let manifests = repo.manifests();
                let manifest = manifests.get(digest).await?;

                let tags = repo.tags();
                for tag in tags.lookup(digest).await? {
                    tags.untag(&tag).await?;
                }

                if let Some(subject) = manifest.subject() {
                    referrers::unlink_referrer(self.driver(), name, &subject.digest, digest)
                        .await?;
                }

                manifests.delete(digest).await
            }
        }
    }

    pub async fn handle_get_manifest(
        &self,
        name: &str,
        reference: &Reference,
    ) -> Result<Response<Body>, Error> {
        let manifest = self.get_manifest(name, reference).await?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, manifest.media_type)
            .header(DOCKER_CONTENT_DIGEST, manifest.digest.to_string())
            .body(Body::fixed(manifest.content))?)
    }

    pub async fn handle_head_manifest(
        &self,
        name: &str,
        reference: &Reference,
    ) -> Result<Response<Body>, Error> {
        let manifest = self.get_manifest(name, reference).await?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, manifest.media_type)
            .header(DOCKER_CONTENT_DIGEST, manifest.digest.to_string())
            .header("Content-Length", manifest.content.len())
            .body(Body::empty())?)
    }

    pub async fn handle_put_manifest(
        &self,
        name: &str,
        reference: &Reference,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Response<Body>, Error> {
        let response = self.put_manifest(name, reference, content_type, body).await?;

        let mut builder = Response::builder()
            .status(StatusCode::CREATED)
            .header("Location", format!("/v2/{name}/manifests/{}", response.digest))
            .header(DOCKER_CONTENT_DIGEST, response.digest.to_string());

        if let Some(subject) = &response.subject {
            builder = builder.header(OCI_SUBJECT, subject.to_string());
        }

        Ok(builder.body(Body::empty())?)
    }

    pub async fn handle_delete_manifest(
        &self,
        name: &str,
        reference: &Reference,
    ) -> Result<Response<Body>, Error> {
        self.delete_manifest(name, reference).await?;

        Ok(Response::builder()
            .status(StatusCode::ACCEPTED)
            .body(Body::empty())?)
    }
}
