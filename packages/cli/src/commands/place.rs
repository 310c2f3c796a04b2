use crate::config::load_config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use pagebuilder_selection::{place_toolbar, Placement, Rect, Size};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct PlaceArgs {
    /// Target rect as `left,top,width,height`
    #[arg(long, value_parser = parse_rect)]
    pub target: Rect,

    /// Toolbar size as `width,height`
    #[arg(long, value_parser = parse_size)]
    pub toolbar: Size,

    /// Viewport size as `width,height`
    #[arg(long, value_parser = parse_size, default_value = "1280,800")]
    pub viewport: Size,

    /// Engine config file (spacing and arrow offset)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the position as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn place(args: PlaceArgs, cwd: &str) -> Result<()> {
    let config = load_config(cwd, args.config.as_deref())?;
    let position = place_toolbar(
        args.target,
        args.toolbar,
        args.viewport,
        config.anchors.metrics(),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&position)?);
        return Ok(());
    }

    let placement = serde_json::to_string(&position.placement)?;
    let placement = placement.trim_matches('"');
    let label = if position.placement == Placement::ViewportClamped {
        placement.yellow()
    } else {
        placement.green()
    };

    println!("{} {}", "Placement:".bold(), label);
    println!("   x: {:.1}", position.x);
    println!("   y: {:.1}", position.y);
    if let Some(arrow) = position.arrow {
        let side = serde_json::to_string(&arrow.side)?;
        println!("   arrow: {} +{:.1}", side.trim_matches('"'), arrow.offset);
    }

    Ok(())
}

fn parse_numbers<const N: usize>(value: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated numbers, got '{}'", N, value));
    }

    let mut numbers = [0.0; N];
    for (slot, part) in numbers.iter_mut().zip(parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", part))?;
        if !slot.is_finite() {
            return Err(format!("'{}' is not a finite number", part));
        }
    }
    Ok(numbers)
}

fn parse_rect(value: &str) -> Result<Rect, String> {
    let [left, top, width, height] = parse_numbers::<4>(value)?;
    Ok(Rect::new(left, top, width, height))
}

fn parse_size(value: &str) -> Result<Size, String> {
    let [width, height] = parse_numbers::<2>(value)?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("size must be positive, got '{}'", value));
    }
    Ok(Size::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_rect() {
        assert_eq!(
            parse_rect("100, 40,320.5,60").unwrap(),
            Rect::new(100.0, 40.0, 320.5, 60.0)
        );
    }

    #[test]
    fn test_rejects_wrong_arity() {
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_size("1,2,3").is_err());
    }

    #[test]
    fn test_rejects_garbage_and_non_positive_sizes() {
        assert!(parse_size("wide,48").unwrap_err().contains("wide"));
        assert!(parse_size("0,48").is_err());
        assert!(parse_rect("NaN,0,1,1").is_err());
    }
}
