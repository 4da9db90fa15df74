use bevy::prelude::*;


#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AreaShape {
    Sphere(Sphere),
    Cuboid(Cuboid),
    /// Y-aligned capsule.
    Capsule(Capsule3d),
}

impl AreaShape {
    fn contains_local(&self, point: Vec3) -> bool {
        match self {
            AreaShape::Sphere(sphere) => point.length_squared() <= sphere.radius * sphere.radius,
            AreaShape::Cuboid(cuboid) => {
                let d = point.abs();
                d.x <= cuboid.half_size.x && d.y <= cuboid.half_size.y && d.z <= cuboid.half_size.z
            }
            AreaShape::Capsule(capsule) => {
                let axis = Vec3::Y * point.y.clamp(-capsule.half_length, capsule.half_length);
                point.distance_squared(axis) <= capsule.radius * capsule.radius
            }
        }
    }

    fn bounding_radius(&self) -> f32 {
        match self {
            AreaShape::Sphere(sphere) => sphere.radius,
            AreaShape::Cuboid(cuboid) => cuboid.half_size.length(),
            AreaShape::Capsule(capsule) => capsule.half_length + capsule.radius,
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaComponent {
    pub shape: AreaShape,
    pub transform: Transform,
}

impl AreaComponent {
    pub fn new(shape: AreaShape, transform: Transform) -> Self {
        Self { shape, transform }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let local = self.transform.compute_affine().inverse().transform_point3(point);
        self.shape.contains_local(local)
    }

    fn bounding_radius(&self) -> f32 {
        self.shape.bounding_radius() * self.transform.scale.abs().max_element()
    }
}


/// World-space region; a point is inside when any component contains it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintArea {
    pub components: Vec<AreaComponent>,
}

impl PaintArea {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self::default().with(AreaComponent::new(
            AreaShape::Sphere(Sphere::new(radius)),
            Transform::from_translation(center),
        ))
    }

    pub fn cuboid(transform: Transform, size: Vec3) -> Self {
        Self::default().with(AreaComponent::new(
            AreaShape::Cuboid(Cuboid::from_size(size)),
            transform,
        ))
    }

    pub fn capsule(transform: Transform, radius: f32, length: f32) -> Self {
        Self::default().with(AreaComponent::new(
            AreaShape::Capsule(Capsule3d::new(radius, length)),
            transform,
        ))
    }

    pub fn with(mut self, component: AreaComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.components.iter().any(|component| component.contains(point))
    }

    pub fn center(&self) -> Vec3 {
        if self.components.is_empty() {
            return Vec3::ZERO;
        }
        self.components
            .iter()
            .map(|component| component.transform.translation)
            .sum::<Vec3>()
            / self.components.len() as f32
    }

    /// Radius around `center` enclosing every component.
    pub fn extent(&self) -> f32 {
        let center = self.center();
        self.components
            .iter()
            .map(|component| {
                component.transform.translation.distance(center) + component.bounding_radius()
            })
            .fold(0.0, f32::max)
    }
}
