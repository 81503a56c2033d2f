pub mod config;
pub mod prediction;
pub mod replicate;
pub mod resolver;
pub mod server;

/// The fixed catalog of hosted models this gateway forwards to
pub mod models {
    /// FLUX 1.1 [pro] in ultra mode, with an image prompt
    pub const FLUX_ULTRA: &str = "black-forest-labs/flux-1.1-pro-ultra";

    /// FLUX.1 Depth [pro]: generation guided by a depth-map control image
    pub const FLUX_DEPTH_PRO: &str = "black-forest-labs/flux-depth-pro";

    /// FLUX.1 Redux [dev]: variations of an input image
    pub const FLUX_REDUX_DEV: &str = "black-forest-labs/flux-redux-dev";
}
