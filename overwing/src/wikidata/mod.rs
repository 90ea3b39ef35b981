//! Wikidata upstream plumbing: SPARQL queries, row mapping, the entity API
//! and the name/QID validator.

mod entity;
mod mapper;
mod sparql;
mod validator;

pub use entity::{
    EntityApi, EntityNode, LabelSource, ENTITY_ENDPOINT, ENTITY_PROVIDER, ENTITY_TIMEOUT,
};
pub use mapper::{
    dimension_multiplier, extract_qid, map_row, map_rows, parse_point, MappedPoi,
};
pub use sparql::{
    cheap_tile_query, cheap_tile_query_url, parse_bindings, sparql_headers, SparqlError,
    SparqlRow, SparqlValue, SPARQL_ENDPOINT, SPARQL_PROVIDER, SPARQL_TIMEOUT,
};
pub use validator::{ConfirmedEntity, Validator};
