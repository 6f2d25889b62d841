//! The boundary flux loop of a single element.

use crate::assembly::buffers::ElementBuffers;
use crate::boundary::{face_centroid, BoundaryCondition, BoundaryResolver, BoundaryValue};
use crate::dof::FieldLayout;
use crate::element::{evaluate_reference_basis, face_local_nodes};
use crate::error::AssemblyError;
use crate::mesh::{FaceAdjacency, MeshAccessor};
use crate::quadrature::QuadratureRegistry;
use log::trace;

/// Adds the Neumann fluxes on the boundary faces of the prepared element to the element load.
///
/// The condition is evaluated once per face and field, at the centroid of the face vertices.
/// Dirichlet faces contribute nothing: their values are imposed by the outer solver. The
/// Jacobian is never touched, since prescribed fluxes do not depend on the unknowns.
pub(crate) fn accumulate_boundary_load(
    mesh: &impl MeshAccessor,
    layout: &FieldLayout,
    condition: &dyn BoundaryCondition,
    resolver: &BoundaryResolver,
    quadrature: &QuadratureRegistry,
    time: f64,
    buffers: &mut ElementBuffers,
) -> Result<(), AssemblyError> {
    let ElementBuffers {
        ranges,
        geometry,
        face_geometry,
        face_state,
        face_basis,
        load,
        ..
    } = buffers;

    let element = geometry.element();
    let geometry_type = geometry.geometry_type();

    for face in 0..mesh.num_faces(element) {
        let FaceAdjacency::Boundary(region) = mesh.face_adjacency(element, face) else {
            continue;
        };
        let centroid = face_centroid(geometry.coordinates(), geometry_type.faces()[face]);
        let has_face_map = geometry.restrict_to_face(face, face_geometry);

        for (f, field) in layout.fields().iter().enumerate() {
            let nodes = face_local_nodes(geometry_type, field.discretization, face);
            if nodes.is_empty() {
                continue;
            }
            let flux = match resolver.resolve(condition, centroid.as_slice(), &field.name, region, time) {
                BoundaryValue::Dirichlet(_) => continue,
                BoundaryValue::Neumann(flux) => flux,
            };
            if flux == 0.0 {
                continue;
            }
            trace!("Element {element}, face {face} (region {region}): flux {flux} on field {}", field.name);

            let offset = ranges[f].start;
            if !has_face_map {
                // Point faces: the flux acts directly on the boundary node
                load[offset + nodes[0]] += flux;
                continue;
            }

            let face_type = face_geometry.geometry_type();
            for (w, xi) in quadrature.face_rule(geometry_type).iter() {
                face_geometry.evaluate(xi, face_state)?;
                let weight = w * face_state.determinant;
                evaluate_reference_basis(face_type, field.discretization, xi, false, face_basis);
                for (k, &node) in nodes.iter().enumerate() {
                    load[offset + node] += weight * flux * face_basis.values[k];
                }
            }
        }
    }
    Ok(())
}
