use anyhow::{anyhow, Context};
use lumen_engine::render::backends::software::SoftwareDriver;
use lumen_engine::render::surface::BitmapSurface;
use lumen_engine::render::{Clip, DisplayItem, IntRect, Layer, LayerId, Matrix, Point, Rect};
use lumen_engine::{Color, Config, DisplayList, Platform, Renderer};
use std::path::PathBuf;

fn scene() -> DisplayList {
    let mut list = DisplayList::new();

    let mut squares = Layer::new(LayerId(1), IntRect::from_size(320, 240));
    squares.push(DisplayItem::Rect { x: 20.0, y: 20.0, w: 120.0, h: 120.0, color: Color::from_u8(220, 40, 40, 255) });
    squares.push(DisplayItem::Rect { x: 80.0, y: 80.0, w: 120.0, h: 120.0, color: Color::new(0.1, 0.3, 0.9, 0.6) });
    list.push_layer(squares);

    let mut triangle = Layer::new(LayerId(2), IntRect::new(-60, -60, 60, 60))
        .with_transform(Matrix::rotation(0.4).then(&Matrix::translation(240.0, 120.0)))
        .with_clip(Clip::new(Rect::new(180.0, 60.0, 320.0, 180.0), Matrix::IDENTITY));
    triangle.push(DisplayItem::Path {
        points: vec![Point::new(0.0, -60.0), Point::new(55.0, 40.0), Point::new(-55.0, 40.0)],
        color: Color::from_u8(40, 170, 80, 255),
    });
    list.push_layer(triangle);

    list
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_string()));

    // CPU path: pixels land in a surface owned by the view
    let mut renderer = Renderer::new(Platform::new(Config::default()))?;
    let id = renderer.create_view(320, 240, false, None, false)?;
    renderer.view_mut(id).ok_or_else(|| anyhow!("view vanished"))?.load_display_list(scene());
    renderer.update();
    let report = renderer.render();
    log::info!("cpu frame: {:?}", report);

    let view = renderer.view(id).ok_or_else(|| anyhow!("view vanished"))?;
    let surface = view
        .surface()
        .and_then(|s| s.as_any().downcast_ref::<BitmapSurface>())
        .ok_or_else(|| anyhow!("view has no bitmap surface"))?;
    let cpu_png = out_dir.join("offscreen-cpu.png");
    surface.bitmap().write_png(&cpu_png).with_context(|| format!("writing {}", cpu_png.display()))?;

    // GPU path through the reference software driver
    let config = Config::builder().use_gpu_renderer(true).build()?;
    let mut renderer = Renderer::new(Platform::new(config).with_gpu_driver(SoftwareDriver::new()))?;
    let id = renderer.create_view(320, 240, false, None, false)?;
    renderer.view_mut(id).ok_or_else(|| anyhow!("view vanished"))?.load_display_list(scene());
    renderer.update();
    let report = renderer.render();
    log::info!("gpu frame: {:?}", report);
    renderer.log_memory_usage();

    let target = renderer
        .view(id)
        .and_then(|v| v.render_target())
        .and_then(|t| t.render_buffer_id)
        .ok_or_else(|| anyhow!("view has no render buffer"))?;
    let driver = renderer
        .gpu_driver()
        .and_then(|d| d.as_any().downcast_ref::<SoftwareDriver>())
        .ok_or_else(|| anyhow!("driver is not the software driver"))?;
    let pixels = driver.render_buffer_pixels(target).ok_or_else(|| anyhow!("render buffer missing"))?;
    let gpu_png = out_dir.join("offscreen-gpu.png");
    pixels.write_png(&gpu_png).with_context(|| format!("writing {}", gpu_png.display()))?;

    println!("wrote {} and {}", cpu_png.display(), gpu_png.display());
    Ok(())
}
