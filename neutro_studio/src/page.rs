//! The single-page upload console, embedded as a static string so the
//! binary serves it without filesystem lookups.

pub const STUDIO_INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Neutrophil Detection Studio</title>
  <style>
    :root {
      --accent: #b42b4c;
      --panel: #f7f4f2;
      --border: #d9cfc9;
    }
    body {
      font-family: system-ui, sans-serif;
      margin: 0;
      background: #fdfcfb;
      color: #27211e;
    }
    main {
      max-width: 860px;
      margin: 0 auto;
      padding: 2rem 1rem 4rem;
    }
    h1 { font-size: 1.6rem; }
    .lead { color: #5c534d; }
    section {
      background: var(--panel);
      border: 1px solid var(--border);
      border-radius: 8px;
      padding: 1rem 1.25rem;
      margin-top: 1.25rem;
    }
    img {
      max-width: 100%;
      border-radius: 4px;
      display: block;
      margin: 0.5rem 0;
    }
    button {
      background: var(--accent);
      color: white;
      border: none;
      border-radius: 6px;
      padding: 0.6rem 1.2rem;
      font-size: 1rem;
      cursor: pointer;
    }
    button:disabled { opacity: 0.6; cursor: wait; }
    a.download {
      display: inline-block;
      margin-top: 0.5rem;
      color: var(--accent);
    }
    table {
      border-collapse: collapse;
      width: 100%;
      margin-top: 0.5rem;
    }
    th, td {
      border: 1px solid var(--border);
      padding: 0.4rem 0.6rem;
      text-align: left;
      font-size: 0.92rem;
    }
    th { background: #efe8e4; }
    .error {
      color: #8f1f1f;
      background: #fbe9e9;
      border: 1px solid #e7b9b9;
      border-radius: 6px;
      padding: 0.6rem 1rem;
      margin-top: 1rem;
    }
    .notice { color: #5c534d; }
  </style>
</head>
<body>
  <main>
    <h1>Neutrophil Detection in Blood Smears</h1>
    <p class="lead">Upload an exam image to identify neutrophils with the detection model.</p>

    <section>
      <label for="file-input">Choose an image&hellip;</label>
      <input id="file-input" type="file" accept=".jpg,.jpeg,.png" />
      <p id="idle-hint" class="notice">Please upload an image to start the detection.</p>
    </section>

    <section id="original-panel" hidden>
      <h2>Original Image</h2>
      <img id="original-image" alt="Uploaded blood smear" />
      <button id="detect-button">Detect Neutrophils</button>
    </section>

    <p id="spinner" class="notice" hidden>Processing image and detecting neutrophils&hellip;</p>
    <p id="error-box" class="error" hidden></p>

    <section id="result-panel" hidden>
      <h2>Detection Result</h2>
      <img id="result-image" alt="Annotated detection result" />
      <a id="download-link" class="download" download="neutrophil_detections.png">Download annotated image</a>

      <h2>Detection Details</h2>
      <p id="empty-message" class="notice" hidden></p>
      <table id="detections-table" hidden>
        <thead>
          <tr>
            <th>Confidence</th>
            <th>Class ID</th>
            <th>Class Name</th>
            <th>Coordinates (x1, y1, x2, y2)</th>
          </tr>
        </thead>
        <tbody></tbody>
      </table>
    </section>
  </main>

  <script>
    const fileInput = document.getElementById("file-input");
    const idleHint = document.getElementById("idle-hint");
    const originalPanel = document.getElementById("original-panel");
    const originalImage = document.getElementById("original-image");
    const detectButton = document.getElementById("detect-button");
    const spinner = document.getElementById("spinner");
    const errorBox = document.getElementById("error-box");
    const resultPanel = document.getElementById("result-panel");
    const resultImage = document.getElementById("result-image");
    const downloadLink = document.getElementById("download-link");
    const emptyMessage = document.getElementById("empty-message");
    const detectionsTable = document.getElementById("detections-table");

    let selectedFile = null;

    fileInput.addEventListener("change", () => {
      selectedFile = fileInput.files[0] || null;
      resultPanel.hidden = true;
      errorBox.hidden = true;
      if (!selectedFile) {
        originalPanel.hidden = true;
        idleHint.hidden = false;
        return;
      }
      originalImage.src = URL.createObjectURL(selectedFile);
      originalPanel.hidden = false;
      idleHint.hidden = true;
    });

    detectButton.addEventListener("click", async () => {
      if (!selectedFile) return;
      spinner.hidden = false;
      errorBox.hidden = true;
      resultPanel.hidden = true;
      detectButton.disabled = true;
      try {
        const form = new FormData();
        form.append("file", selectedFile);
        const response = await fetch("/predict", { method: "POST", body: form });
        if (!response.ok) {
          throw new Error(await response.text());
        }
        const summary = JSON.parse(response.headers.get("x-detections") || "{}");
        const url = URL.createObjectURL(await response.blob());
        resultImage.src = url;
        downloadLink.href = url;
        renderSummary(summary);
        resultPanel.hidden = false;
      } catch (err) {
        errorBox.textContent = err.message || "Detection failed.";
        errorBox.hidden = false;
      } finally {
        spinner.hidden = true;
        detectButton.disabled = false;
      }
    });

    function renderSummary(summary) {
      const tbody = detectionsTable.querySelector("tbody");
      tbody.innerHTML = "";
      if (!summary.count) {
        emptyMessage.textContent =
          summary.message || "No neutrophils detected above the confidence threshold.";
        emptyMessage.hidden = false;
        detectionsTable.hidden = true;
        return;
      }
      emptyMessage.hidden = true;
      for (const row of summary.rows) {
        const tr = document.createElement("tr");
        const coords = row.bbox.map((v) => v.toFixed(1)).join(", ");
        for (const value of [row.confidence, row.class_id, row.class_name, "(" + coords + ")"]) {
          const td = document.createElement("td");
          td.textContent = value;
          tr.appendChild(td);
        }
        tbody.appendChild(tr);
      }
      detectionsTable.hidden = false;
    }
  </script>
</body>
</html>
"#;
