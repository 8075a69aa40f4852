use hyper::{Method, Uri};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;

use crate::registry::api::content_discovery::OrasReferrersQuery;
use crate::registry::oci::{Digest, Reference};

fn parse_query<T: DeserializeOwned + Default>(params: &str) -> T {
    serde_urlencoded::from_str(params).unwrap_or_default()
}

#[derive(Debug)]
pub enum Route<'a> {
    ApiVersion,
    ListCatalog {
        n: Option<usize>,
        last: Option<String>,
    },
    ListTags {
        namespace: &'a str,
        n: Option<usize>,
        last: Option<String>,
    },
    GetManifest {
        namespace: &'a str,
        reference: Reference,
    },
    HeadManifest {
        namespace: &'a str,
        reference: Reference,
    },
    PutManifest {
        namespace: &'a str,
        reference: Reference,
    },
    DeleteManifest {
        namespace: &'a str,
        reference: Reference,
    },
    GetReferrers {
        namespace: &'a str,
        digest: Digest,
        artifact_type: Option<String>,
    },
    OrasReferrers {
        namespace: &'a str,
        digest: Digest,
        query: OrasReferrersQuery,
    },
    Extension {
        path: &'a str,
    },
    Unknown,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ArtifactTypeQuery {
    artifact_type: Option<String>,
}

#[derive(Deserialize, Default)]
struct PaginationQuery {
    n: Option<usize>,
    last: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct OrasQuery {
    artifact_type: Option<String>,
    n: Option<String>,
    next_token: Option<String>,
}

pub fn parse<'a>(method: &Method, uri: &'a Uri) -> Route<'a> {
    let path = uri.path();
    let params = uri.query();

    match path {
        "/v2" | "/v2/" if method == Method::GET => return Route::ApiVersion,
        "/v2/_catalog" if method == Method::GET => {
            let query = params.map(parse_query::<PaginationQuery>).unwrap_or_default();
            return Route::ListCatalog {
                n: query.n,
                last: query.last,
            };
        }
        _ => {}
    }

    if let Some(route) = try_find_oras_referrers(method, path, params) {
        return route;
    }

    let Some(path) = path.strip_prefix("/v2/") else {
        return Route::Unknown;
    };

    if let Some(route) = try_find_manifests(method, path) {
        return route;
    }

    if let Some(route) = try_find_referrers(method, path, params) {
        return route;
    }

    if let Some(route) = try_find_tags(method, path, params) {
        return route;
    }

    if path.contains("/_") || path.starts_with('_') {
        return Route::Extension { path };
    }

    Route::Unknown
}

fn try_find_manifests<'a>(method: &Method, path: &'a str) -> Option<Route<'a>> {
    let manifest_position = path.rfind("/manifests/")?;
    let namespace = &path[..manifest_position];

    let reference = &path[manifest_position + "/manifests/".len()..];
    let reference = Reference::from_str(reference).ok()?;

    match *method {
        Method::GET => Some(Route::GetManifest {
            namespace,
            reference,
        }),
        Method::HEAD => Some(Route::HeadManifest {
            namespace,
            reference,
        }),
        Method::PUT => Some(Route::PutManifest {
            namespace,
            reference,
        }),
        Method::DELETE => Some(Route::DeleteManifest {
            namespace,
            reference,
        }),
        _ => None,
    }
}

fn try_find_referrers<'a>(
    method: &Method,
    path: &'a str,
    params: Option<&'a str>,
) -> Option<Route<'a>> {
    let referrers_position = path.rfind("/referrers/")?;
    let namespace = &path[..referrers_position];

    let digest = &path[referrers_position + "/referrers/".len()..];
    let digest = Digest::try_from(digest).ok()?;

    if *method != Method::GET {
        return None;
    }

    let artifact_type = params
        .map(parse_query::<ArtifactTypeQuery>)
        .and_then(|query| query.artifact_type);

    Some(Route::GetReferrers {
        namespace,
        digest,
        artifact_type,
    })
}

fn try_find_oras_referrers<'a>(
    method: &Method,
    path: &'a str,
    params: Option<&'a str>,
) -> Option<Route<'a>> {
    let path = path.strip_prefix("/oras/artifacts/v1/")?;
    let path = path.strip_suffix("/referrers")?;

    let manifest_position = path.rfind("/manifests/")?;
    let namespace = &path[..manifest_position];

    let digest = &path[manifest_position + "/manifests/".len()..];
    let digest = Digest::try_from(digest).ok()?;

    if *method != Method::GET {
        return None;
    }

    let query = params.map(parse_query::<OrasQuery>).unwrap_or_default();

    Some(Route::OrasReferrers {
        namespace,
        digest,
        query: OrasReferrersQuery {
            artifact_type: query.artifact_type,
            n: query.n,
            next_token: query.next_token,
        },
    })
}

fn try_find_tags<'a>(method: &Method, path: &'a str, params: Option<&'a str>) -> Option<Route<'a>> {
    let namespace = path.strip_suffix("/tags/list")?;
    if *method != Method::GET {
        return None;
    }

    let query = params.map(parse_query::<PaginationQuery>).unwrap_or_default();
    Some(Route::ListTags {
        namespace,
        n: query.n,
        last: query.last,
    })
}
