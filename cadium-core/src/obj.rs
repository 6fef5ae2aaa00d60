/// Wavefront OBJ parser: geometry only, materials are ignored
use log::debug;
use nalgebra::{Point3, Vector3};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, i64 as index, not_line_ending, space0, space1},
    combinator::{all_consuming, map, opt, rest},
    multi::{many_m_n, separated_list1},
    number::complete::float,
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::error::ViewerError;
use crate::geometry::{Mesh, Triangle, Vertex};
use crate::loader::MeshFormat;
use crate::scene::{Material, Node};

/// One `v/vt/vn` reference inside a face statement
#[derive(Debug, Clone, Copy, PartialEq)]
struct FaceRef {
    position: i64,
    normal: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement<'a> {
    Position(Point3<f32>),
    Normal(Vector3<f32>),
    Face(Vec<FaceRef>),
    Object(&'a str),
    Other,
}

fn vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    tuple((
        preceded(space1, float),
        preceded(space1, float),
        preceded(space1, float),
    ))(input)
}

fn position(input: &str) -> IResult<&str, Statement> {
    // A trailing `w` or per-vertex `r g b` is accepted and dropped
    let (input, (x, y, z)) = preceded(tag("v"), vector3)(input)?;
    let (input, _) = many_m_n(0, 3, preceded(space1, float))(input)?;
    Ok((input, Statement::Position(Point3::new(x, y, z))))
}

fn normal(input: &str) -> IResult<&str, Statement> {
    map(preceded(tag("vn"), vector3), |(x, y, z)| {
        Statement::Normal(Vector3::new(x, y, z))
    })(input)
}

fn face_ref(input: &str) -> IResult<&str, FaceRef> {
    let (input, position) = index(input)?;
    // `/vt` is optional and may be empty as in `v//vn`
    let (input, _) = opt(preceded(char('/'), opt(index)))(input)?;
    let (input, normal) = opt(preceded(char('/'), index))(input)?;
    Ok((input, FaceRef { position, normal }))
}

fn face(input: &str) -> IResult<&str, Statement> {
    map(
        preceded(terminated(tag("f"), space1), separated_list1(space1, face_ref)),
        Statement::Face,
    )(input)
}

fn object(input: &str) -> IResult<&str, Statement> {
    map(
        preceded(
            alt((tag("o"), tag("g"))),
            alt((preceded(space1, not_line_ending), space0)),
        ),
        |name: &str| Statement::Object(name.trim()),
    )(input)
}

/// Statements that carry nothing the viewer draws
fn ignored(input: &str) -> IResult<&str, Statement> {
    map(
        tuple((
            alt((
                tag("vt"),
                tag("vp"),
                tag("s"),
                tag("usemtl"),
                tag("mtllib"),
                tag("l"),
                tag("p"),
            )),
            alt((preceded(space1, rest), rest)),
        )),
        |_| Statement::Other,
    )(input)
}

fn statement(line: &str) -> IResult<&str, Statement> {
    all_consuming(terminated(
        alt((normal, ignored, position, face, object)),
        space0,
    ))(line)
}

/// Resolve a 1-based (or negative, relative) OBJ index into `len` items.
fn resolve(idx: i64, len: usize) -> Option<usize> {
    let resolved = if idx > 0 {
        idx - 1
    } else if idx < 0 {
        len as i64 + idx
    } else {
        return None;
    };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

struct Builder {
    positions: Vec<Point3<f32>>,
    normals: Vec<Vector3<f32>>,
    name: String,
    mesh: Mesh,
    done: Vec<Node>,
}

impl Builder {
    fn flush(&mut self) {
        if !self.mesh.is_empty() {
            let mesh = std::mem::take(&mut self.mesh);
            self.done
                .push(Node::mesh(self.name.clone(), mesh, Material::native()));
        }
    }

    fn add_face(&mut self, refs: &[FaceRef], line_no: usize) -> Result<(), ViewerError> {
        if refs.len() < 3 {
            return Err(obj_error(line_no, "face needs at least three vertices"));
        }

        let mut corners = Vec::with_capacity(refs.len());
        for r in refs {
            let p = resolve(r.position, self.positions.len())
                .ok_or_else(|| obj_error(line_no, format!("vertex index {} out of range", r.position)))?;
            let n = match r.normal {
                Some(n) => Some(
                    resolve(n, self.normals.len())
                        .ok_or_else(|| obj_error(line_no, format!("normal index {n} out of range")))?,
                ),
                None => None,
            };
            corners.push((self.positions[p], n.map(|n| self.normals[n])));
        }

        // Fan triangulation around the first corner
        for i in 1..corners.len() - 1 {
            let tri = [corners[0], corners[i], corners[i + 1]];
            let flat = Triangle::new(
                Vertex { position: tri[0].0, normal: Vector3::zeros() },
                Vertex { position: tri[1].0, normal: Vector3::zeros() },
                Vertex { position: tri[2].0, normal: Vector3::zeros() },
            )
            .calculate_normal();
            let vertex = |(position, normal): (Point3<f32>, Option<Vector3<f32>>)| Vertex {
                position,
                normal: normal.unwrap_or(flat),
            };
            self.mesh
                .add_triangle(Triangle::new(vertex(tri[0]), vertex(tri[1]), vertex(tri[2])));
        }
        Ok(())
    }
}

fn obj_error(line_no: usize, reason: impl std::fmt::Display) -> ViewerError {
    ViewerError::parse(MeshFormat::Obj, format!("line {line_no}: {reason}"))
}

/// Parse OBJ text into a group with one mesh child per `o`/`g` section.
///
/// Every mesh carries a native placeholder material.
pub fn parse_obj(input: &str) -> Result<Node, ViewerError> {
    let mut builder = Builder {
        positions: Vec::new(),
        normals: Vec::new(),
        name: String::new(),
        mesh: Mesh::new(),
        done: Vec::new(),
    };

    for (i, raw) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let (_, stmt) = statement(line).map_err(|_| match line.split_whitespace().next() {
            Some(keyword @ ("v" | "vn" | "f" | "o" | "g")) => {
                obj_error(line_no, format!("malformed '{keyword}' statement"))
            }
            _ => obj_error(line_no, "unrecognised statement"),
        })?;

        match stmt {
            Statement::Position(p) => builder.positions.push(p),
            Statement::Normal(n) => builder.normals.push(n),
            Statement::Face(refs) => builder.add_face(&refs, line_no)?,
            Statement::Object(name) => {
                builder.flush();
                builder.name = name.to_string();
            }
            Statement::Other => {}
        }
    }
    builder.flush();

    debug!(
        "parsed OBJ: {} positions, {} meshes",
        builder.positions.len(),
        builder.done.len()
    );
    Ok(Node::group("", builder.done))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MaterialKind, NodeKind};

    fn children(node: &Node) -> &[Node] {
        match &node.kind {
            NodeKind::Group(children) => children,
            NodeKind::Mesh(_) => panic!("expected a group"),
        }
    }

    #[test]
    fn test_quad_is_fan_triangulated() {
        let node = parse_obj("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();
        assert_eq!(node.triangle_count(), 2);
        assert_eq!(children(&node).len(), 1);
    }

    #[test]
    fn test_face_reference_forms() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvn 0 0 -1\n\
                   f 1/1/1 2/1/1 3/1/1\nf 1//1 2//1 3//1\nf 1/1 2/1 3/1\n";
        let node = parse_obj(src).unwrap();
        assert_eq!(node.triangle_count(), 3);

        let mut normals = Vec::new();
        node.for_each_mesh(&mut |m| {
            for t in &m.geometry.mesh().triangles {
                normals.push(t.vertices[0].normal);
            }
        });
        // Explicit normals win; the bare face falls back to the flat normal.
        assert_eq!(normals[0], Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(normals[1], Vector3::new(0.0, 0.0, -1.0));
        assert!((normals[2] - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_negative_indices_are_relative() {
        let node = parse_obj("v 0 0 0\nv 2 0 0\nv 0 2 0\nf -3 -2 -1\n").unwrap();
        let bb = node.bounding_box(&nalgebra::Matrix4::identity()).unwrap();
        assert_eq!(bb.max_dimension(), 2.0);
    }

    #[test]
    fn test_objects_and_groups_split_meshes() {
        let src = "# two parts\nmtllib parts.mtl\no first\nv 0 0 0\nv 1 0 0\nv 0 1 0\n\
                   usemtl steel\ns off\nf 1 2 3\ng second\nf 1 3 2\n";
        let node = parse_obj(src).unwrap();
        let parts = children(&node);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "first");
        assert_eq!(parts[1].name, "second");
        for part in parts {
            match &part.kind {
                NodeKind::Mesh(m) => assert_eq!(m.material.kind, MaterialKind::Native),
                NodeKind::Group(_) => panic!("expected mesh"),
            }
        }
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_vertex_colors_are_ignored() {
        let src = "v 0 0 0 1 0 0\nv 2 0 0 0 1 0\nv 0 2 0 1.0\nf 1 2 3\n";
        let node = parse_obj(src).unwrap();
        assert_eq!(node.triangle_count(), 1);
        let bb = node.bounding_box(&nalgebra::Matrix4::identity()).unwrap();
        assert_eq!(bb.max_dimension(), 2.0);
        assert_eq!(bb.min.z, 0.0);

        assert!(parse_obj("v 0 0 0 1 2 3 4\n").is_err());
    }

    #[test]
    fn test_malformed_vertex_is_an_error() {
        assert!(parse_obj("v 0 zero 0\n").is_err());
        assert!(parse_obj("bogus 1 2 3\n").is_err());
    }

    #[test]
    fn test_empty_input_gives_empty_group() {
        let node = parse_obj("# nothing here\n\n").unwrap();
        assert!(children(&node).is_empty());
        assert!(node.bounding_box(&nalgebra::Matrix4::identity()).is_none());
    }
}
