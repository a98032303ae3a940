//! The asset tasks: images, icons, styles and scripts
//!
//! Each constructor reads its settings from the [`BuildContext`] once; the
//! build mode picks which conditional steps are live.

use super::PipelineTask;
use crate::build::{BuildContext, Pipeline, Sources};
use crate::transform::{
    CompressImage, ExternalTool, InitSourceMap, MinifyCss, PrefixCss, Rename, ResizeImage, When,
    WriteSourceMap,
};

/// Re-encode every image under the images source patterns.
pub fn minify_images(ctx: &BuildContext) -> PipelineTask {
    let images = &ctx.config().images;
    let pipeline = Pipeline::new("minify-images", ctx.out_path(&images.out))
        .pipe(CompressImage::from_config(images));

    PipelineTask::new("minify-images", Sources::globs(ctx.src_dir(), &images.sources), vec![pipeline])
}

/// Generate one `favicon-{w}x{h}.png` per configured size from the avatar.
pub fn build_icons(ctx: &BuildContext) -> PipelineTask {
    let icons = &ctx.config().icons;
    let images = &ctx.config().images;
    let dest = ctx.out_path(&icons.out);

    let pipelines = icons
        .sizes
        .iter()
        .map(|&[width, height]| {
            Pipeline::new(format!("icon {}x{}", width, height), &dest)
                .pipe(ResizeImage::new(width, height, icons.upscale))
                .pipe(CompressImage::from_config(images))
                .pipe(Rename::to(format!("favicon-{}x{}.png", width, height)))
        })
        .collect();

    PipelineTask::new("build-icons", Sources::single(ctx.src_path(&icons.source)), pipelines)
}

/// Compile, prefix and (in production) minify the entry stylesheet.
pub fn styles(ctx: &BuildContext) -> PipelineTask {
    let styles = &ctx.config().styles;
    let prod = ctx.is_production();

    let sass = ExternalTool::new("sass", ctx.config().tools.sass.clone(), ctx.project_root())
        .with_output_extension("css");

    let pipeline = Pipeline::new("styles", ctx.out_path(&styles.out))
        .pipe(When::new(!prod, InitSourceMap))
        .pipe(sass)
        .pipe(PrefixCss::new(&styles.targets))
        .pipe(When::new(!prod, WriteSourceMap))
        .pipe(When::new(prod, MinifyCss::new(&styles.targets)))
        .pipe(When::new(prod, Rename::suffix(".min")));

    PipelineTask::new("styles", Sources::single(ctx.src_path(&styles.entry)), vec![pipeline])
}

/// Transpile every script and (in production) minify it.
pub fn scripts(ctx: &BuildContext) -> PipelineTask {
    let scripts = &ctx.config().scripts;
    let tools = &ctx.config().tools;
    let prod = ctx.is_production();

    let pipeline = Pipeline::new("scripts", ctx.out_path(&scripts.out))
        .pipe(When::new(!prod, InitSourceMap))
        .pipe(ExternalTool::new("babel", tools.babel.clone(), ctx.project_root()))
        .pipe(When::new(!prod, WriteSourceMap))
        .pipe(When::new(prod, ExternalTool::new("terser", tools.terser.clone(), ctx.project_root())))
        .pipe(When::new(prod, Rename::suffix(".min")));

    PipelineTask::new("scripts", Sources::globs(ctx.src_dir(), &scripts.sources), vec![pipeline])
}
