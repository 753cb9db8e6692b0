//! S3 bucket gateway

use crate::classify::SdkResultExt;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use landflow_cloud::{
    Gateway, GatewayResult, Readiness, ResolvedDependencies, ResourceFacts, ResourceSpec, attr,
    param,
};
use tracing::{debug, info, instrument};

/// Region where S3 rejects an explicit location constraint
const DEFAULT_REGION: &str = "us-east-1";

pub struct BucketGateway {
    client: Client,
}

impl BucketGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn facts(bucket: &str) -> ResourceFacts {
        ResourceFacts::new(bucket).with_attribute(attr::ARN, format!("arn:aws:s3:::{}", bucket))
    }

    async fn exists(&self, bucket: &str) -> GatewayResult<bool> {
        let found = self
            .client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .or_not_found("head bucket")?;
        Ok(found.is_some())
    }

    /// Delete every object so the bucket itself can be deleted
    async fn empty(&self, bucket: &str) -> GatewayResult<()> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut deleted = 0usize;
        while let Some(page) = pages.next().await {
            let Some(page) = page.or_not_found("list objects")? else {
                return Ok(());
            };
            for key in page.contents().iter().filter_map(|object| object.key()) {
                self.client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .gateway("delete object")?;
                deleted += 1;
            }
        }
        debug!(bucket, deleted, "Emptied bucket");
        Ok(())
    }
}

#[async_trait]
impl Gateway for BucketGateway {
    fn name(&self) -> &str {
        "s3-bucket"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let bucket: String = spec.require_param(param::NAME)?;
        Ok(self.exists(&bucket).await?.then(|| Self::facts(&bucket)))
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let bucket: String = spec.require_param(param::NAME)?;
        let region: String = spec.require_param(param::REGION)?;

        let mut request = self.client.create_bucket().bucket(&bucket);
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            );
        }
        request.send().await.gateway("create bucket")?;

        info!(bucket = %bucket, region = %region, "Created bucket");
        Ok(Self::facts(&bucket))
    }

    async fn probe(&self, _spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        Ok(if self.exists(&facts.id).await? {
            Readiness::Ready
        } else {
            Readiness::Pending("not visible yet".to_string())
        })
    }

    #[instrument(skip_all, fields(resource = %spec.name, bucket = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        self.empty(&facts.id).await?;
        let deleted = self
            .client
            .delete_bucket()
            .bucket(&facts.id)
            .send()
            .await
            .or_not_found("delete bucket")?;
        if deleted.is_some() {
            info!("Deleted bucket");
        }
        Ok(())
    }
}
