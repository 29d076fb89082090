//! Service compilation
//!
//! One [`Compilation`] owns every piece of mutable state of a pass: the
//! helper registry, the type catalog and the validators. It is created per
//! service and consumed into a [`ServiceModel`].

use std::collections::BTreeSet;

use proc_macro2::TokenStream;
use quote::quote;
use stubgen_schema::analysis::recursive_types;
use stubgen_schema::{AttributeNode, RepresentationContext, Schema, TypeId};

use crate::catalog::TypeCatalog;
use crate::config::CodegenConfig;
use crate::endpoint::{self, EndpointModel};
use crate::error::{CompileError, Result};
use crate::generator::{PlanRequest, Transform};
use crate::lower::{ident, lower_plan};
use crate::plan::{ConversionPlan, Direction};
use crate::protocol::Protocol;
use crate::registry::HelperRegistry;
use crate::resolver::ResolveOptions;
use crate::support;
use crate::validation::Validators;

pub struct Compilation<'s> {
    pub schema: &'s Schema,
    pub config: CodegenConfig,
    pub service_ctx: RepresentationContext,
    pub wire_ctx: RepresentationContext,
    pub recursive: BTreeSet<TypeId>,
    pub registry: HelperRegistry,
    pub catalog: TypeCatalog,
    pub validators: Validators,
}

impl<'s> Compilation<'s> {
    pub fn new(schema: &'s Schema, config: CodegenConfig) -> Self {
        let wire_ctx = config.protocol.wire_context(&config.wire_namespace);
        Self {
            schema,
            service_ctx: RepresentationContext::service(),
            wire_ctx,
            recursive: recursive_types(schema),
            registry: HelperRegistry::new(),
            catalog: TypeCatalog::new(),
            validators: Validators::new(),
            config,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    /// Path tokens of the generated support module.
    pub fn support_tokens(&self) -> TokenStream {
        let segments = self.config.support_path.split("::").map(ident);
        quote! { #(#segments)::* }
    }

    /// Builds a top-level plan. `Encode` goes from the service context to
    /// the wire context, `Decode` the other way and `Project` stays in the
    /// service context.
    pub fn plan(&mut self, direction: Direction, request: PlanRequest<'_>) -> Result<ConversionPlan> {
        let (source_ctx, target_ctx) = match direction {
            Direction::Encode => (&self.service_ctx, &self.wire_ctx),
            Direction::Decode => (&self.wire_ctx, &self.service_ctx),
            Direction::Project => (&self.service_ctx, &self.service_ctx),
        };
        let transform = Transform {
            schema: self.schema,
            source_ctx,
            target_ctx,
            direction,
            options: ResolveOptions {
                share_named: self.config.share_named_types,
            },
            helper_prefix: self.config.helper_prefix.as_deref(),
            recursive: &self.recursive,
        };
        transform.plan(&mut self.registry, request)
    }

    pub fn register_service_type(&mut self, node: &AttributeNode, hint: &str) {
        self.catalog
            .register(self.schema, &self.service_ctx, node, hint, &self.recursive);
    }

    pub fn register_wire_type(&mut self, node: &AttributeNode, hint: &str) {
        self.catalog
            .register(self.schema, &self.wire_ctx, node, hint, &self.recursive);
    }

    /// Name of the validator for a decoded service value, if it has fields.
    pub fn validator(&mut self, node: &AttributeNode, hint: &str) -> Option<String> {
        let support = self.support_tokens();
        self.validators
            .for_message(self.schema, &self.service_ctx, node, hint, &support)
    }

    /// Validator for a result rendered by a view; `None` renders every
    /// attribute.
    pub fn view_validator(
        &mut self,
        node: &AttributeNode,
        hint: &str,
        view: Option<(&str, &[String])>,
    ) -> Option<String> {
        let support = self.support_tokens();
        self.validators
            .for_view(self.schema, &self.service_ctx, node, hint, view, &support)
    }
}

/// Everything generated for one service.
#[derive(Debug)]
pub struct ServiceModel {
    pub name: String,
    /// Digest of the schema document the model was built from.
    pub fingerprint: String,
    pub config: CodegenConfig,
    pub endpoints: Vec<EndpointModel>,
    pub registry: HelperRegistry,
    pub catalog: TypeCatalog,
    pub validators: Validators,
}

impl ServiceModel {
    pub fn endpoint(&self, method: &str) -> Option<&EndpointModel> {
        self.endpoints.iter().find(|e| e.method == method)
    }

    pub fn helpers(&self) -> impl Iterator<Item = &ConversionPlan> {
        self.registry.plans()
    }

    pub fn helper(&self, name: &str) -> Option<&ConversionPlan> {
        self.registry.by_name(name)
    }

    /// Top-level and helper plans together.
    pub fn plan_count(&self) -> usize {
        self.registry.len() + self.endpoints.iter().map(|e| e.plans.len()).sum::<usize>()
    }

    /// The complete generated source for the service.
    pub fn to_tokens(&self) -> Result<TokenStream> {
        let support = support::tokens(&self.config);
        let types = self.catalog.to_tokens();
        let helpers = self
            .registry
            .plans()
            .map(lower_plan)
            .collect::<Result<Vec<_>>>()?;
        let validators = self.validators.tokens();
        let endpoints = self
            .endpoints
            .iter()
            .map(EndpointModel::to_tokens)
            .collect::<Result<Vec<_>>>()?;
        Ok(quote! {
            #support
            #types
            #(#helpers)*
            #validators
            #(#endpoints)*
        })
    }
}

/// Compiles every method of service `name`.
pub fn compile_service(schema: &Schema, name: &str, config: &CodegenConfig) -> Result<ServiceModel> {
    let service = schema
        .service(name)
        .ok_or_else(|| CompileError::UnknownService(name.to_string()))?;
    let mut comp = Compilation::new(schema, config.clone());

    let mut endpoints = Vec::with_capacity(service.methods.len());
    for method in &service.methods {
        endpoints.push(endpoint::build(&mut comp, service, method)?);
    }

    tracing::info!(
        service = %service.name,
        endpoints = endpoints.len(),
        helpers = comp.registry.len(),
        types = comp.catalog.len(),
        "compiled service"
    );
    Ok(ServiceModel {
        name: service.name.clone(),
        fingerprint: schema.fingerprint.clone(),
        config: comp.config,
        endpoints,
        registry: comp.registry,
        catalog: comp.catalog,
        validators: comp.validators,
    })
}
