//! Mesh file export.
//!
//! Every format is written to a temporary sibling file and renamed into place
//! once complete, so readers never observe a partially written mesh and a
//! failed write leaves nothing behind.

use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Triangle};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeshFormat {
    /// Binary STL.
    #[default]
    #[serde(rename = "stl")]
    Stl,
    /// ASCII STL.
    #[serde(rename = "stl-ascii")]
    StlAscii,
    /// Wavefront OBJ.
    #[serde(rename = "obj")]
    Obj,
    /// ASCII PLY.
    #[serde(rename = "ply")]
    Ply,
    /// 3D Manufacturing Format (zip container).
    #[serde(rename = "3mf")]
    ThreeMf,
    /// Legacy VTK polydata.
    #[serde(rename = "vtk")]
    Vtk,
}

impl MeshFormat {
    /// All formats, in token order.
    pub const ALL: [MeshFormat; 6] = [
        MeshFormat::Stl,
        MeshFormat::StlAscii,
        MeshFormat::Obj,
        MeshFormat::Ply,
        MeshFormat::ThreeMf,
        MeshFormat::Vtk,
    ];

    /// Token accepted by [`FromStr`].
    pub fn token(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::StlAscii => "stl-ascii",
            MeshFormat::Obj => "obj",
            MeshFormat::Ply => "ply",
            MeshFormat::ThreeMf => "3mf",
            MeshFormat::Vtk => "vtk",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Stl | MeshFormat::StlAscii => "stl",
            MeshFormat::Obj => "obj",
            MeshFormat::Ply => "ply",
            MeshFormat::ThreeMf => "3mf",
            MeshFormat::Vtk => "vtk",
        }
    }

    /// Whether the format stores per-vertex normals when present.
    pub fn carries_vertex_normals(&self) -> bool {
        matches!(self, MeshFormat::Obj | MeshFormat::Ply | MeshFormat::Vtk)
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for MeshFormat {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        MeshFormat::ALL
            .into_iter()
            .find(|f| f.token() == token)
            .ok_or_else(|| MeshError::UnsupportedFormat {
                token: s.to_string(),
            })
    }
}

/// Write a mesh to `path` in the given format.
///
/// Parent directories are created as needed. Paths with `..` components are
/// refused.
///
/// # Example
/// ```no_run
/// use segmesh_mesh::{Mesh, MeshFormat, write_mesh};
/// use std::path::Path;
///
/// let mesh = Mesh::new();
/// write_mesh(&mesh, Path::new("meshes/empty.stl"), MeshFormat::Stl).unwrap();
/// ```
pub fn write_mesh(mesh: &Mesh, path: &Path, format: MeshFormat) -> MeshResult<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(MeshError::io_write(
            path,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "output path must not contain '..' components",
            ),
        ));
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| MeshError::CreateDir {
        path: parent.to_path_buf(),
        source: e,
    })?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".segmesh-").suffix(".tmp");
    // Temp files default to 0600; meshes get the mode of a plain create.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder
        .tempfile_in(parent)
        .map_err(|e| MeshError::io_write(path, e))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh");

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        encode(mesh, format, name, &mut writer).map_err(|e| MeshError::io_write(path, e))?;
        writer.flush().map_err(|e| MeshError::io_write(path, e))?;
    }

    tmp.persist(path)
        .map_err(|e| MeshError::io_write(path, e.error))?;

    debug!(
        path = %path.display(),
        %format,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Wrote mesh"
    );

    Ok(())
}

fn encode<W: Write + Seek>(mesh: &Mesh, format: MeshFormat, name: &str, w: &mut W) -> io::Result<()> {
    match format {
        MeshFormat::Stl => encode_stl_binary(mesh, w),
        MeshFormat::StlAscii => encode_stl_ascii(mesh, name, w),
        MeshFormat::Obj => encode_obj(mesh, name, w),
        MeshFormat::Ply => encode_ply(mesh, w),
        MeshFormat::ThreeMf => encode_3mf(mesh, w),
        MeshFormat::Vtk => encode_vtk(mesh, name, w),
    }
}

fn facet_normal(tri: &Triangle) -> [f32; 3] {
    let n = tri.normal().unwrap_or_else(nalgebra::Vector3::zeros);
    [n.x as f32, n.y as f32, n.z as f32]
}

fn encode_stl_binary<W: Write>(mesh: &Mesh, w: &mut W) -> io::Result<()> {
    let to_vertex = |p: &nalgebra::Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);

    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| stl_io::Triangle {
            normal: stl_io::Normal::new(facet_normal(&tri)),
            vertices: [to_vertex(&tri.v0), to_vertex(&tri.v1), to_vertex(&tri.v2)],
        })
        .collect();

    stl_io::write_stl(w, triangles.iter())
}

fn encode_stl_ascii<W: Write>(mesh: &Mesh, name: &str, w: &mut W) -> io::Result<()> {
    writeln!(w, "solid {name}")?;
    for tri in mesh.triangles() {
        let n = facet_normal(&tri);
        writeln!(w, "  facet normal {:e} {:e} {:e}", n[0], n[1], n[2])?;
        writeln!(w, "    outer loop")?;
        for p in [tri.v0, tri.v1, tri.v2] {
            writeln!(
                w,
                "      vertex {:e} {:e} {:e}",
                p.x as f32, p.y as f32, p.z as f32
            )?;
        }
        writeln!(w, "    endloop")?;
        writeln!(w, "  endfacet")?;
    }
    writeln!(w, "endsolid {name}")
}

fn encode_obj<W: Write>(mesh: &Mesh, name: &str, w: &mut W) -> io::Result<()> {
    let has_normals = mesh.vertices.iter().all(|v| v.normal.is_some()) && !mesh.vertices.is_empty();

    writeln!(w, "# segmesh export")?;
    writeln!(w, "# vertices: {}", mesh.vertex_count())?;
    writeln!(w, "# faces: {}", mesh.face_count())?;
    writeln!(w, "o {name}")?;

    for v in &mesh.vertices {
        writeln!(
            w,
            "v {:.6} {:.6} {:.6}",
            v.position.x, v.position.y, v.position.z
        )?;
    }

    if has_normals {
        for n in mesh.vertices.iter().filter_map(|v| v.normal) {
            writeln!(w, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }

    // OBJ indices are 1-based.
    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i + 1);
        if has_normals {
            writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(w, "f {a} {b} {c}")?;
        }
    }

    Ok(())
}

fn encode_ply<W: Write>(mesh: &Mesh, w: &mut W) -> io::Result<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    };
    use ply_rs::writer::Writer;

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    let float_prop = |name: &str| {
        PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::Float))
    };

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(float_prop(axis));
    }
    if has_normals {
        for axis in ["nx", "ny", "nz"] {
            vertex_def.properties.add(float_prop(axis));
        }
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let vertices: Vec<DefaultElement> = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(v.position.x as f32));
            element.insert("y".to_string(), Property::Float(v.position.y as f32));
            element.insert("z".to_string(), Property::Float(v.position.z as f32));
            if has_normals {
                let n = v.normal.unwrap_or_else(nalgebra::Vector3::zeros);
                element.insert("nx".to_string(), Property::Float(n.x as f32));
                element.insert("ny".to_string(), Property::Float(n.y as f32));
                element.insert("nz".to_string(), Property::Float(n.z as f32));
            }
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces: Vec<DefaultElement> = mesh
        .faces
        .iter()
        .map(|face| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(face.iter().map(|&i| i as i32).collect()),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    ply.make_consistent()
        .map_err(|e| io::Error::other(format!("PLY consistency error: {e:?}")))?;

    Writer::new().write_ply(w, &mut ply)?;
    Ok(())
}

/// 3MF content types part.
const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>
"#;

/// 3MF package relationships part.
const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/3dmodel.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>
"#;

fn encode_3mf<W: Write + Seek>(mesh: &Mesh, w: &mut W) -> io::Result<()> {
    let mut zip = zip::ZipWriter::new(w);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)
        .map_err(io::Error::other)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

    zip.start_file("_rels/.rels", options)
        .map_err(io::Error::other)?;
    zip.write_all(RELS_XML.as_bytes())?;

    zip.start_file("3D/3dmodel.model", options)
        .map_err(io::Error::other)?;
    zip.write_all(model_xml(mesh).as_bytes())?;

    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

fn model_xml(mesh: &Mesh) -> String {
    use std::fmt::Write as _;

    let mut xml = String::with_capacity(mesh.vertices.len() * 50 + mesh.faces.len() * 40 + 512);
    xml.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources>
    <object id="1" type="model">
      <mesh>
        <vertices>
"#,
    );

    for v in &mesh.vertices {
        let _ = writeln!(
            xml,
            "          <vertex x=\"{:.6}\" y=\"{:.6}\" z=\"{:.6}\"/>",
            v.position.x, v.position.y, v.position.z
        );
    }

    xml.push_str("        </vertices>\n        <triangles>\n");

    for face in &mesh.faces {
        let _ = writeln!(
            xml,
            "          <triangle v1=\"{}\" v2=\"{}\" v3=\"{}\"/>",
            face[0], face[1], face[2]
        );
    }

    xml.push_str(
        r#"        </triangles>
      </mesh>
    </object>
  </resources>
  <build>
    <item objectid="1"/>
  </build>
</model>
"#,
    );

    xml
}

fn encode_vtk<W: Write>(mesh: &Mesh, name: &str, w: &mut W) -> io::Result<()> {
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "{name}")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET POLYDATA")?;
    writeln!(w, "POINTS {} float", mesh.vertex_count())?;
    for v in &mesh.vertices {
        writeln!(
            w,
            "{} {} {}",
            v.position.x as f32, v.position.y as f32, v.position.z as f32
        )?;
    }

    writeln!(w, "POLYGONS {} {}", mesh.face_count(), mesh.face_count() * 4)?;
    for face in &mesh.faces {
        writeln!(w, "3 {} {} {}", face[0], face[1], face[2])?;
    }

    let has_normals = !mesh.vertices.is_empty() && mesh.vertices.iter().all(|v| v.normal.is_some());
    if has_normals {
        writeln!(w, "POINT_DATA {}", mesh.vertex_count())?;
        writeln!(w, "NORMALS normals float")?;
        for n in mesh.vertices.iter().filter_map(|v| v.normal) {
            writeln!(w, "{} {} {}", n.x as f32, n.y as f32, n.z as f32)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use std::io::Read;
    use tempfile::TempDir;

    fn tetrahedron() -> Mesh {
        Mesh {
            vertices: vec![
                Vertex::from_coords(0.0, 0.0, 0.0),
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
                Vertex::from_coords(0.0, 0.0, 1.0),
            ],
            faces: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        }
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn test_format_tokens() {
        for format in MeshFormat::ALL {
            assert_eq!(format.token().parse::<MeshFormat>().unwrap(), format);
        }
        assert_eq!(" STL ".parse::<MeshFormat>().unwrap(), MeshFormat::Stl);
        assert_eq!(MeshFormat::StlAscii.extension(), "stl");
        assert_eq!(MeshFormat::ThreeMf.to_string(), "3mf");

        let err = "fbx".parse::<MeshFormat>().unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { ref token } if token == "fbx"));
    }

    #[test]
    fn test_write_binary_stl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.stl");
        write_mesh(&tetrahedron(), &path, MeshFormat::Stl).unwrap();

        let mut file = fs::File::open(&path).unwrap();
        let stl = stl_io::read_stl(&mut file).unwrap();
        assert_eq!(stl.faces.len(), 4);
        assert_eq!(stl.vertices.len(), 4);
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_write_empty_binary_stl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.stl");
        write_mesh(&Mesh::new(), &path, MeshFormat::Stl).unwrap();

        // 80-byte header plus a zero triangle count.
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 84);
        assert_eq!(&bytes[80..84], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_ascii_stl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.stl");
        write_mesh(&tetrahedron(), &path, MeshFormat::StlAscii).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("solid tet\n"));
        assert!(text.trim_end().ends_with("endsolid tet"));
        assert_eq!(text.matches("facet normal").count(), 4);
        assert_eq!(text.matches("vertex ").count(), 12);
    }

    #[test]
    fn test_write_obj_readable_by_tobj() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.obj");
        write_mesh(&tetrahedron(), &path, MeshFormat::Obj).unwrap();

        let (models, _) = tobj::load_obj(&path, &tobj::LoadOptions::default()).unwrap();
        assert_eq!(models.len(), 1);
        let loaded = &models[0].mesh;
        assert_eq!(loaded.positions.len(), 12);

        // The loader may renumber vertices, so compare corner positions per face.
        let corner = |i: u32| -> [f32; 3] {
            let i = i as usize * 3;
            [loaded.positions[i], loaded.positions[i + 1], loaded.positions[i + 2]]
        };
        let expected = tetrahedron();
        let loaded_faces: Vec<[[f32; 3]; 3]> = loaded
            .indices
            .chunks(3)
            .map(|f| [corner(f[0]), corner(f[1]), corner(f[2])])
            .collect();
        let expected_faces: Vec<[[f32; 3]; 3]> = expected
            .faces
            .iter()
            .map(|f| {
                f.map(|v| {
                    let p = &expected.vertices[v as usize].position;
                    [p.x as f32, p.y as f32, p.z as f32]
                })
            })
            .collect();
        assert_eq!(loaded_faces, expected_faces);
    }

    #[cfg(unix)]
    #[test]
    fn test_written_file_mode_matches_plain_create() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let reference = dir.path().join("reference");
        fs::File::create(&reference).unwrap();
        let path = dir.path().join("tet.stl");
        write_mesh(&tetrahedron(), &path, MeshFormat::Stl).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&reference));
    }

    #[test]
    fn test_write_obj_with_normals() {
        let mut mesh = tetrahedron();
        mesh.compute_vertex_normals();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.obj");
        write_mesh(&mesh, &path, MeshFormat::Obj).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 4);
        assert!(text.contains("f 1//1 3//3 2//2"));
    }

    #[test]
    fn test_write_ply_readable() {
        use ply_rs::parser::Parser;
        use ply_rs::ply::DefaultElement;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.ply");
        write_mesh(&tetrahedron(), &path, MeshFormat::Ply).unwrap();

        let mut file = fs::File::open(&path).unwrap();
        let ply = Parser::<DefaultElement>::new().read_ply(&mut file).unwrap();
        assert_eq!(ply.payload.get("vertex").map(Vec::len), Some(4));
        assert_eq!(ply.payload.get("face").map(Vec::len), Some(4));
    }

    #[test]
    fn test_write_3mf_package() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.3mf");
        write_mesh(&tetrahedron(), &path, MeshFormat::ThreeMf).unwrap();

        let file = fs::File::open(&path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert!(archive.by_name("[Content_Types].xml").is_ok());
        assert!(archive.by_name("_rels/.rels").is_ok());

        let mut model = String::new();
        archive
            .by_name("3D/3dmodel.model")
            .unwrap()
            .read_to_string(&mut model)
            .unwrap();
        assert_eq!(model.matches("<vertex ").count(), 4);
        assert_eq!(model.matches("<triangle ").count(), 4);
    }

    #[test]
    fn test_write_vtk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.vtk");
        write_mesh(&tetrahedron(), &path, MeshFormat::Vtk).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# vtk DataFile Version 3.0");
        assert_eq!(lines[3], "DATASET POLYDATA");
        assert_eq!(lines[4], "POINTS 4 float");
        assert!(text.contains("POLYGONS 4 16"));
        assert!(text.contains("3 1 2 3"));
        assert!(!text.contains("NORMALS"));
    }

    #[test]
    fn test_empty_mesh_in_every_format() {
        let dir = TempDir::new().unwrap();
        for format in MeshFormat::ALL {
            let path = dir
                .path()
                .join(format!("empty_{}.{}", format.token(), format.extension()));
            write_mesh(&Mesh::new(), &path, format).unwrap();
            assert!(path.exists(), "{format} was not written");
            assert!(fs::metadata(&path).unwrap().len() > 0);
        }
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("tet.obj");
        write_mesh(&tetrahedron(), &path, MeshFormat::Obj).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_refuses_parent_components() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("..").join("tet.obj");
        let err = write_mesh(&tetrahedron(), &path, MeshFormat::Obj).unwrap_err();
        match err {
            MeshError::IoWrite { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let path = blocker.join("tet.stl");
        let err = write_mesh(&tetrahedron(), &path, MeshFormat::Stl).unwrap_err();
        assert!(matches!(err, MeshError::CreateDir { .. }));
        assert!(err.is_io());
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.vtk");
        fs::write(&path, b"stale").unwrap();

        write_mesh(&tetrahedron(), &path, MeshFormat::Vtk).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("# vtk"));
    }
}
