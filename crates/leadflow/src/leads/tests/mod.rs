mod common;
mod distribution;
mod routing;
mod scoring;
