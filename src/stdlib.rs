use crate::{
    engine::EngineBuilder,
    value::{Function, ObjectValue},
};

/// Registers `math`, plus the shared `variable` namespace under `variable`
/// and `v`.
pub fn install(builder: EngineBuilder) -> EngineBuilder {
    builder
        .bind_object("math", math())
        .bind_value("variable", ObjectValue::mutable())
        .bind_alias("v", "variable")
}

/// The `math` namespace. Angles are in degrees.
pub fn math() -> ObjectValue {
    ObjectValue::builder()
        .constant("pi", 180.0_f64.to_radians())
        .function("abs", pure1(f64::abs))
        .function("acos", pure1(|x| x.acos().to_degrees()))
        .function("asin", pure1(|x| x.asin().to_degrees()))
        .function("atan", pure1(|x| x.atan().to_degrees()))
        .function("atan2", pure2(|y, x| y.atan2(x).to_degrees()))
        .function("ceil", pure1(f64::ceil))
        .function("clamp", pure3(clamp))
        .function("cos", pure1(|x| x.to_radians().cos()))
        .function("exp", pure1(f64::exp))
        .function("floor", pure1(f64::floor))
        .function("hermite_blend", pure1(|t| 3.0 * t * t - 2.0 * t * t * t))
        .function("lerp", pure3(|a, b, t| a + (b - a) * t))
        .function("lerprotate", pure3(lerp_rotate))
        .function("ln", pure1(f64::ln))
        .function("max", pure2(f64::max))
        .function("min", pure2(f64::min))
        .function("min_angle", pure1(min_angle))
        .function("mod", pure2(|a, b| a % b))
        .function("pow", pure2(f64::powf))
        .function("round", pure1(|x| (x + 0.5).floor()))
        .function("sin", pure1(|x| x.to_radians().sin()))
        .function("sqrt", pure1(f64::sqrt))
        .function("trunc", pure1(f64::trunc))
        .function("random", Function::number2(false, random))
        .function("random_integer", Function::number2(false, random_integer))
        .function(
            "die_roll",
            Function::number3(false, |count, low, high| {
                (0..rolls(count)).map(|_| random(low, high)).sum()
            }),
        )
        .function(
            "die_roll_integer",
            Function::number3(false, |count, low, high| {
                (0..rolls(count)).map(|_| random_integer(low, high)).sum()
            }),
        )
        .build()
}

fn pure1(f: fn(f64) -> f64) -> Function {
    Function::number1(true, f)
}

fn pure2(f: fn(f64, f64) -> f64) -> Function {
    Function::number2(true, f)
}

fn pure3(f: fn(f64, f64, f64) -> f64) -> Function {
    Function::number3(true, f)
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Wraps an angle into `[-180, 180)`.
fn min_angle(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Interpolates along the shortest arc between two angles.
fn lerp_rotate(start: f64, end: f64, t: f64) -> f64 {
    let start = min_angle(start);
    let mut end = min_angle(end);
    if end - start > 180.0 {
        end -= 360.0;
    } else if end - start < -180.0 {
        end += 360.0;
    }
    start + (end - start) * t
}

/// Uniform in `[low, high)`; collapses to `low` on an empty range.
fn random(low: f64, high: f64) -> f64 {
    if !(high > low) {
        return low;
    }
    low + rand::random::<f64>() * (high - low)
}

/// Uniform integer in `[low, high]` after rounding both bounds.
fn random_integer(low: f64, high: f64) -> f64 {
    let (low, high) = ((low + 0.5).floor(), (high + 0.5).floor());
    if !(high > low) {
        return low;
    }
    (low + (rand::random::<f64>() * (high - low + 1.0)).floor()).min(high)
}

fn rolls(count: f64) -> u64 {
    let count = (count + 0.5).floor();
    if count >= 1.0 {
        count as u64
    } else {
        0
    }
}
